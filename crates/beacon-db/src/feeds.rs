use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::{debug, info};

use beacon_types::api::ViewRow;
use beacon_types::hasher;

use crate::convert::{from_millis, json_column, to_json};
use crate::models::FeedRow;
use crate::{Database, StoreError, StoreResult, content};

const FEED_COLUMNS: &str = "id, source_id, source_value, view_name, content_ids";

fn map_feed(row: &Row<'_>) -> rusqlite::Result<FeedRow> {
    Ok(FeedRow {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_value: row.get(2)?,
        view_name: row.get(3)?,
        content_ids: json_column(row, 4)?,
    })
}

pub(crate) fn feed_in(conn: &Connection, id: i32) -> StoreResult<Option<FeedRow>> {
    let row = conn
        .query_row(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"), [id], map_feed)
        .optional()?;
    Ok(row)
}

pub(crate) fn feed_exists(conn: &Connection, id: i32) -> StoreResult<bool> {
    let found = conn
        .query_row("SELECT 1 FROM feeds WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn content_ids_in(conn: &Connection, id: i32) -> StoreResult<Option<Vec<i32>>> {
    let ids = conn
        .query_row("SELECT content_ids FROM feeds WHERE id = ?1", [id], |row| json_column(row, 0))
        .optional()?;
    Ok(ids)
}

pub(crate) fn set_content_ids(conn: &Connection, id: i32, ids: &[i32]) -> StoreResult<()> {
    conn.execute("UPDATE feeds SET content_ids = ?2 WHERE id = ?1", params![id, to_json(ids)?])?;
    Ok(())
}

/// Creates a source-keyed feed unless one with this id already exists.
pub(crate) fn ensure_feed(conn: &Connection, id: i32, source_id: &str, source_value: &str) -> StoreResult<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO feeds (id, source_id, source_value) VALUES (?1, ?2, ?3)",
        params![id, source_id, source_value],
    )?;
    if inserted > 0 {
        debug!(feed_id = id, source_id, source_value, "feed created for rule");
    }
    Ok(())
}

/// Drops the feed, its view, and its id from every content item.
pub(crate) fn delete_feed_in(conn: &Connection, id: i32) -> StoreResult<bool> {
    let Some(feed) = feed_in(conn, id)? else {
        return Ok(false);
    };

    for content_id in &feed.content_ids {
        let ids: Option<Vec<i32>> = conn
            .query_row("SELECT feed_ids FROM content_items WHERE id = ?1", [content_id], |row| {
                json_column(row, 0)
            })
            .optional()?;
        if let Some(mut ids) = ids {
            ids.retain(|f| *f != id);
            conn.execute(
                "UPDATE content_items SET feed_ids = ?2 WHERE id = ?1",
                params![content_id, to_json(&ids)?],
            )?;
        }
    }

    if let Some(view) = &feed.view_name {
        conn.execute_batch(&format!("DROP VIEW IF EXISTS \"{view}\";"))?;
    }
    conn.execute("DELETE FROM feeds WHERE id = ?1", [id])?;

    debug!(feed_id = id, "feed deleted");
    Ok(true)
}

fn valid_view_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn create_view(conn: &Connection, feed_id: i32, name: &str) -> StoreResult<()> {
    let taken = conn
        .query_row("SELECT 1 FROM sqlite_master WHERE name = ?1 COLLATE NOCASE", [name], |_| Ok(()))
        .optional()?;
    if taken.is_some() {
        return Err(StoreError::Conflict(format!("view name {name} is taken")));
    }

    conn.execute_batch(&format!(
        "CREATE VIEW \"{name}\" AS
            SELECT * FROM feed_content
            WHERE content_id IN (
                SELECT value FROM json_each((SELECT content_ids FROM feeds WHERE id = {feed_id}))
            );"
    ))?;
    Ok(())
}

fn view_rows(conn: &Connection, sql: &str) -> StoreResult<Vec<ViewRow>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map([], |row| {
            let mut out = ViewRow::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = match row.get_ref(idx)? {
                    ValueRef::Null | ValueRef::Blob(_) => Value::Null,
                    ValueRef::Integer(ms) if name == "expires_at" => {
                        Value::String(from_millis(ms).to_rfc3339())
                    }
                    ValueRef::Integer(i) => Value::from(i),
                    ValueRef::Real(f) => Value::from(f),
                    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
                };
                out.insert(name.clone(), value);
            }
            Ok(out)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    // -- Feeds --

    /// Creates a feed keyed by `id`, or by `hash(source_id, source_value)`
    /// when no id is supplied.
    pub fn create_feed(
        &self,
        id: Option<i32>,
        source_id: Option<&str>,
        source_value: Option<&str>,
        view_name: Option<&str>,
    ) -> StoreResult<FeedRow> {
        let id = match (id, source_id, source_value) {
            (Some(id), _, _) => id,
            (None, Some(sid), Some(value)) => hasher::feed_id(sid, value),
            _ => {
                return Err(StoreError::BadRequest(
                    "a feed needs an id or a source id and value".into(),
                ));
            }
        };
        if let Some(name) = view_name {
            if !valid_view_name(name) {
                return Err(StoreError::BadRequest(format!("invalid view name {name:?}")));
            }
        }

        self.with_tx(|conn| {
            if feed_exists(conn, id)? {
                return Err(StoreError::Conflict(format!("feed {id} exists")));
            }
            conn.execute(
                "INSERT INTO feeds (id, source_id, source_value, view_name) VALUES (?1, ?2, ?3, ?4)",
                params![id, source_id, source_value, view_name],
            )?;
            if let Some(name) = view_name {
                create_view(conn, id, name)?;
            }
            content::reindex(conn)?;

            info!(feed_id = id, view = ?view_name, "feed created");
            feed_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("feed {id}")))
        })
    }

    pub fn list_feeds(&self) -> StoreResult<Vec<FeedRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY view_name, id"))?;
            let rows = stmt.query_map([], map_feed)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn read_feed(&self, id: i32) -> StoreResult<FeedRow> {
        self.with_conn(|conn| feed_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("feed {id}"))))
    }

    pub fn feed_by_view_name(&self, name: &str) -> StoreResult<FeedRow> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE view_name = ?1"),
                [name],
                map_feed,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("view {name}")))
        })
    }

    pub fn delete_feed(&self, id: i32) -> StoreResult<()> {
        self.with_tx(|conn| {
            if delete_feed_in(conn, id)? {
                Ok(())
            } else {
                Err(StoreError::NotFound(format!("feed {id}")))
            }
        })
    }

    pub fn delete_all_feeds(&self) -> StoreResult<usize> {
        self.with_tx(|conn| {
            let ids = {
                let mut stmt = conn.prepare("SELECT id FROM feeds")?;
                stmt.query_map([], |row| row.get::<_, i32>(0))?
                    .collect::<Result<Vec<_>, _>>()?
            };
            for id in &ids {
                delete_feed_in(conn, *id)?;
            }
            info!(count = ids.len(), "all feeds deleted");
            Ok(ids.len())
        })
    }

    /// Feed-content rows, either all of them or those behind a registered view.
    pub fn view_content(&self, view: Option<&str>) -> StoreResult<Vec<ViewRow>> {
        self.with_conn(|conn| match view {
            None => view_rows(conn, "SELECT * FROM feed_content ORDER BY content_id"),
            Some(name) => {
                let registered = valid_view_name(name)
                    && conn
                        .query_row("SELECT 1 FROM feeds WHERE view_name = ?1", [name], |_| Ok(()))
                        .optional()?
                        .is_some();
                if !registered {
                    return Err(StoreError::BadRequest(format!("unknown view {name:?}")));
                }
                view_rows(conn, &format!("SELECT * FROM \"{name}\" ORDER BY content_id"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_id_derives_from_source() {
        let db = Database::open_in_memory().unwrap();
        let feed = db.create_feed(None, Some("urn:x"), Some("red"), None).unwrap();
        assert_eq!(feed.id, hasher::feed_id("urn:x", "red"));
        assert!(feed.content_ids.is_empty());

        assert!(matches!(
            db.create_feed(None, Some("urn:x"), Some("red"), None),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(db.create_feed(None, None, None, None), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn view_names_are_validated_and_unique() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.create_feed(Some(1), None, None, Some("bad name;")),
            Err(StoreError::BadRequest(_))
        ));
        db.create_feed(Some(1), None, None, Some("red_units")).unwrap();
        assert!(matches!(
            db.create_feed(Some(2), None, None, Some("red_units")),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            db.create_feed(Some(3), None, None, Some("messages")),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(db.feed_by_view_name("red_units").unwrap().id, 1);
    }

    #[test]
    fn feeds_list_by_view_name() {
        let db = Database::open_in_memory().unwrap();
        db.create_feed(Some(1), None, None, Some("zulu")).unwrap();
        db.create_feed(Some(2), None, None, Some("alpha")).unwrap();
        let names: Vec<_> = db.list_feeds().unwrap().into_iter().filter_map(|f| f.view_name).collect();
        assert_eq!(names, vec!["alpha", "zulu"]);
    }

    #[test]
    fn unknown_view_is_bad_request() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.view_content(Some("nope")), Err(StoreError::BadRequest(_))));
        assert!(db.view_content(None).unwrap().is_empty());
    }

    #[test]
    fn delete_drops_view() {
        let db = Database::open_in_memory().unwrap();
        db.create_feed(Some(7), None, None, Some("temp_view")).unwrap();
        db.delete_feed(7).unwrap();
        assert!(matches!(db.read_feed(7), Err(StoreError::NotFound(_))));
        assert!(matches!(db.delete_feed(7), Err(StoreError::NotFound(_))));
        db.create_feed(Some(8), None, None, Some("temp_view")).unwrap();
    }
}
