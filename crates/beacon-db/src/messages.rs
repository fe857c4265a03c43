use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use beacon_types::models::PreparedMessage;

use crate::convert::{time_column, to_millis};
use crate::expiry::expire_message_in;
use crate::models::MessageRow;
use crate::{Database, StoreError, StoreResult, content};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

const MESSAGE_COLUMNS: &str =
    "id, distribution_id, sender_id, sent_at, distribution_type, body, delete_pending";

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        distribution_id: row.get(1)?,
        sender_id: row.get(2)?,
        sent_at: time_column(row, 3)?,
        distribution_type: row.get(4)?,
        body: row.get(5)?,
        delete_pending: row.get(6)?,
    })
}

pub(crate) fn message_in(conn: &Connection, id: i32) -> StoreResult<Option<MessageRow>> {
    let row = conn
        .query_row(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"), [id], map_message)
        .optional()?;
    Ok(row)
}

fn insert_message(conn: &Connection, msg: &PreparedMessage) -> StoreResult<()> {
    let de = &msg.envelope;
    conn.execute(
        "INSERT INTO messages (id, distribution_id, sender_id, sent_at, distribution_type, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            msg.id,
            de.distribution_id,
            de.sender_id,
            to_millis(&de.sent_at),
            de.distribution_type.as_str(),
            msg.body,
        ],
    )?;
    for item in &msg.items {
        content::insert_item(conn, msg.id, de, item)?;
    }
    debug!(message_id = msg.id, items = msg.items.len(), "message inserted");
    Ok(())
}

/// Overwrites the message row and diffs its content items by id.
fn replace_message(conn: &Connection, msg: &PreparedMessage) -> StoreResult<()> {
    let de = &msg.envelope;
    conn.execute(
        "UPDATE messages
         SET sent_at = ?2, distribution_type = ?3, body = ?4, delete_pending = 0
         WHERE id = ?1",
        params![msg.id, to_millis(&de.sent_at), de.distribution_type.as_str(), msg.body],
    )?;

    let old = content::item_ids(conn, msg.id)?;
    for stale in old.iter().filter(|id| !msg.items.iter().any(|i| i.id == **id)) {
        content::remove_item(conn, *stale)?;
    }
    for item in &msg.items {
        if old.contains(&item.id) {
            content::update_item(conn, msg.id, de, item)?;
        } else {
            content::insert_item(conn, msg.id, de, item)?;
        }
    }
    debug!(message_id = msg.id, items = msg.items.len(), "message replaced");
    Ok(())
}

/// Removes content items (both index sides and projections) and then the
/// message. Returns whether the message existed.
pub(crate) fn delete_message_in(conn: &Connection, id: i32) -> StoreResult<bool> {
    for content_id in content::item_ids(conn, id)? {
        content::remove_item(conn, content_id)?;
    }
    let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

fn list_query(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> StoreResult<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, map_message)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    // -- Messages --

    pub fn message_exists(&self, id: i32) -> StoreResult<bool> {
        self.with_conn(|conn| Ok(message_in(conn, id)?.is_some()))
    }

    pub fn create_message(&self, msg: &PreparedMessage) -> StoreResult<i32> {
        self.with_tx(|conn| {
            if message_in(conn, msg.id)?.is_some() {
                return Err(StoreError::Conflict(format!("message {} exists", msg.id)));
            }
            insert_message(conn, msg)?;
            info!(message_id = msg.id, "message created");
            Ok(msg.id)
        })
    }

    /// Creates the message, or replaces it when the incoming copy is at least
    /// as new as the stored one. Older copies are a conflict.
    pub fn upsert_message(&self, msg: &PreparedMessage) -> StoreResult<UpsertOutcome> {
        self.with_tx(|conn| {
            let Some(existing) = message_in(conn, msg.id)? else {
                insert_message(conn, msg)?;
                info!(message_id = msg.id, "message created by update");
                return Ok(UpsertOutcome::Created);
            };
            if to_millis(&existing.sent_at) > to_millis(&msg.envelope.sent_at) {
                return Err(StoreError::Conflict(format!(
                    "stale update: stored copy sent at {}",
                    existing.sent_at.to_rfc3339()
                )));
            }
            replace_message(conn, msg)?;
            info!(message_id = msg.id, "message updated");
            Ok(UpsertOutcome::Updated)
        })
    }

    pub fn read_message(&self, id: i32) -> StoreResult<MessageRow> {
        self.with_conn(|conn| message_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("message {id}"))))
    }

    pub fn list_messages(&self) -> StoreResult<Vec<MessageRow>> {
        self.with_conn(|conn| {
            list_query(conn, &format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY sent_at DESC"), [])
        })
    }

    /// Messages sent within `[from, to]`. `to` defaults to `now` and never
    /// reaches past it.
    pub fn search_messages(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<MessageRow>> {
        if from >= now {
            return Err(StoreError::BadRequest("search start must be in the past".into()));
        }
        let to = to.unwrap_or(now);
        if from > to {
            return Err(StoreError::BadRequest("search start is after its end".into()));
        }
        let to = to.min(now);

        self.with_conn(|conn| {
            list_query(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE sent_at >= ?1 AND sent_at <= ?2 ORDER BY sent_at"
                ),
                params![to_millis(&from), to_millis(&to)],
            )
        })
    }

    pub fn delete_message(&self, id: i32) -> StoreResult<bool> {
        self.with_tx(|conn| {
            let deleted = delete_message_in(conn, id)?;
            if deleted {
                info!(message_id = id, "message deleted");
            }
            Ok(deleted)
        })
    }

    pub fn delete_all_messages(&self) -> StoreResult<usize> {
        self.with_tx(|conn| {
            conn.execute("UPDATE feeds SET content_ids = '[]'", [])?;
            conn.execute("DELETE FROM feed_content", [])?;
            conn.execute("DELETE FROM content_items", [])?;
            let deleted = conn.execute("DELETE FROM messages", [])?;
            info!(deleted, "all messages deleted");
            Ok(deleted)
        })
    }

    /// Marks the message for the next purge, the same way expiry does.
    pub fn cancel_message(&self, id: i32, now: DateTime<Utc>) -> StoreResult<()> {
        self.with_tx(|conn| {
            if message_in(conn, id)?.is_none() {
                return Err(StoreError::NotFound(format!("message {id}")));
            }
            expire_message_in(conn, id, now)?;
            info!(message_id = id, "message cancelled");
            Ok(())
        })
    }

    /// Rewrites a single-content message in one transaction. `patch` gets
    /// the stored body and returns the replacement.
    pub fn update_position<F, E>(&self, id: i32, patch: F) -> Result<PreparedMessage, E>
    where
        F: FnOnce(&str) -> Result<PreparedMessage, E>,
        E: From<StoreError>,
    {
        self.with_tx(|conn| {
            let existing = message_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
            let items = content::item_ids(conn, id)?;
            if items.len() != 1 {
                return Err(StoreError::Conflict(format!(
                    "message {id} has {} content items, position updates need one",
                    items.len()
                ))
                .into());
            }

            let prepared = patch(&existing.body)?;
            if prepared.id != id {
                return Err(StoreError::Invalid("patched message changed identity".into()).into());
            }
            replace_message(conn, &prepared)?;
            info!(message_id = id, "message position updated");
            Ok(prepared)
        })
    }
}
