//! Content items, their feed-content projection, and the two-sided index
//! between content items and feeds.
//!
//! `content_items.feed_ids` and `feeds.content_ids` are inverses. Every
//! helper here touches both sides inside the caller's transaction.

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use beacon_types::models::{DistributionElement, GeoPoint, PreparedContent};

use crate::convert::{json_column, time_column, to_json, to_millis};
use crate::matcher::{self, MatchTerms};
use crate::models::{ContentRow, FeedContentRow};
use crate::{Database, StoreResult, feeds};

pub(crate) fn insert_item(
    conn: &Connection,
    message_id: i32,
    envelope: &DistributionElement,
    item: &PreparedContent,
) -> StoreResult<()> {
    let terms = MatchTerms::for_content(envelope, &item.object);
    let feed_ids = matcher::resolve_feed_targets(conn, &terms)?;

    conn.execute(
        "INSERT INTO content_items (id, message_id, expires_at, payload, terms, feed_ids)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            item.id,
            message_id,
            to_millis(&item.expires_at),
            item.payload,
            to_json(&terms)?,
            to_json(&feed_ids)?,
        ],
    )?;
    write_view(conn, message_id, item)?;
    sync_feeds(conn, item.id, &[], &feed_ids)?;

    debug!(content_id = item.id, message_id, feeds = feed_ids.len(), "content item inserted");
    Ok(())
}

pub(crate) fn update_item(
    conn: &Connection,
    message_id: i32,
    envelope: &DistributionElement,
    item: &PreparedContent,
) -> StoreResult<()> {
    let old = item_feed_ids(conn, item.id)?;
    let terms = MatchTerms::for_content(envelope, &item.object);
    let new = matcher::resolve_feed_targets(conn, &terms)?;

    conn.execute(
        "UPDATE content_items SET expires_at = ?2, payload = ?3, terms = ?4, feed_ids = ?5 WHERE id = ?1",
        params![
            item.id,
            to_millis(&item.expires_at),
            item.payload,
            to_json(&terms)?,
            to_json(&new)?,
        ],
    )?;
    write_view(conn, message_id, item)?;
    sync_feeds(conn, item.id, &old, &new)?;

    debug!(content_id = item.id, message_id, "content item updated");
    Ok(())
}

/// Removes one item from every feed, then its projection, then the item.
pub(crate) fn remove_item(conn: &Connection, content_id: i32) -> StoreResult<()> {
    let old = item_feed_ids(conn, content_id)?;
    sync_feeds(conn, content_id, &old, &[])?;
    conn.execute("DELETE FROM feed_content WHERE content_id = ?1", [content_id])?;
    conn.execute("DELETE FROM content_items WHERE id = ?1", [content_id])?;
    Ok(())
}

pub(crate) fn item_ids(conn: &Connection, message_id: i32) -> StoreResult<Vec<i32>> {
    let mut stmt = conn.prepare("SELECT id FROM content_items WHERE message_id = ?1 ORDER BY rowid")?;
    let ids = stmt
        .query_map([message_id], |row| row.get(0))?
        .collect::<Result<Vec<i32>, _>>()?;
    Ok(ids)
}

fn item_feed_ids(conn: &Connection, content_id: i32) -> StoreResult<Vec<i32>> {
    let ids = conn
        .query_row("SELECT feed_ids FROM content_items WHERE id = ?1", [content_id], |row| {
            json_column(row, 0)
        })
        .optional()?;
    Ok(ids.unwrap_or_default())
}

/// Applies the difference between `old` and `new` to the feed side.
fn sync_feeds(conn: &Connection, content_id: i32, old: &[i32], new: &[i32]) -> StoreResult<()> {
    for feed_id in old.iter().filter(|f| !new.contains(f)) {
        edit_feed(conn, *feed_id, |ids| ids.retain(|c| *c != content_id))?;
    }
    for feed_id in new.iter().filter(|f| !old.contains(f)) {
        edit_feed(conn, *feed_id, |ids| {
            if !ids.contains(&content_id) {
                ids.push(content_id);
            }
        })?;
    }
    Ok(())
}

fn edit_feed<F>(conn: &Connection, feed_id: i32, edit: F) -> StoreResult<()>
where
    F: FnOnce(&mut Vec<i32>),
{
    let Some(mut ids) = feeds::content_ids_in(conn, feed_id)? else {
        return Ok(());
    };
    edit(&mut ids);
    feeds::set_content_ids(conn, feed_id, &ids)
}

fn write_view(conn: &Connection, message_id: i32, item: &PreparedContent) -> StoreResult<()> {
    let view = &item.view;
    conn.execute(
        "INSERT OR REPLACE INTO feed_content
            (content_id, message_id, title, friendly_name, description, icon_url, image_url,
             latitude, longitude, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            item.id,
            message_id,
            view.title,
            view.friendly_name,
            view.description,
            view.icon_url,
            view.image_url,
            view.location.map(|p| p.lat),
            view.location.map(|p| p.lon),
            to_millis(&item.expires_at),
        ],
    )?;
    Ok(())
}

/// Recomputes feed membership for every stored item after rules or feeds
/// change. Returns how many items moved.
pub(crate) fn reindex(conn: &Connection) -> StoreResult<usize> {
    let items = {
        let mut stmt = conn.prepare("SELECT id, terms, feed_ids FROM content_items")?;
        stmt.query_map([], |row| {
            Ok((
                row.get::<_, i32>(0)?,
                json_column::<MatchTerms>(row, 1)?,
                json_column::<Vec<i32>>(row, 2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?
    };

    let mut changed = 0;
    for (content_id, terms, old) in items {
        let new = matcher::resolve_feed_targets(conn, &terms)?;
        if new == old {
            continue;
        }
        conn.execute(
            "UPDATE content_items SET feed_ids = ?2 WHERE id = ?1",
            params![content_id, to_json(&new)?],
        )?;
        sync_feeds(conn, content_id, &old, &new)?;
        changed += 1;
    }

    debug!(changed, "feed index rebuilt");
    Ok(changed)
}

impl Database {
    pub fn content_items(&self, message_id: i32) -> StoreResult<Vec<ContentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, expires_at, payload, terms, feed_ids
                 FROM content_items WHERE message_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ContentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        expires_at: time_column(row, 2)?,
                        payload: row.get(3)?,
                        terms: json_column(row, 4)?,
                        feed_ids: json_column(row, 5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn feed_content(&self, content_id: i32) -> StoreResult<Option<FeedContentRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT content_id, message_id, title, friendly_name, description, icon_url,
                            image_url, latitude, longitude, expires_at
                     FROM feed_content WHERE content_id = ?1",
                    [content_id],
                    |row| {
                        let lat: Option<f64> = row.get(7)?;
                        let lon: Option<f64> = row.get(8)?;
                        Ok(FeedContentRow {
                            content_id: row.get(0)?,
                            message_id: row.get(1)?,
                            title: row.get(2)?,
                            friendly_name: row.get(3)?,
                            description: row.get(4)?,
                            icon_url: row.get(5)?,
                            image_url: row.get(6)?,
                            location: lat
                                .zip(lon)
                                .map(|(lat, lon)| GeoPoint { lat, lon }),
                            expires_at: time_column(row, 9)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}
