//! Sweep primitives. Each runs as one transaction: a failure part way rolls
//! back the whole batch.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::convert::to_millis;
use crate::messages::delete_message_in;
use crate::{Database, StoreResult};

/// Pins every content expiry of the message one second before `now` and
/// marks it delete-pending.
pub(crate) fn expire_message_in(conn: &Connection, id: i32, now: DateTime<Utc>) -> StoreResult<()> {
    let expired = to_millis(&(now - Duration::seconds(1)));
    conn.execute(
        "UPDATE content_items SET expires_at = ?2 WHERE message_id = ?1",
        params![id, expired],
    )?;
    conn.execute(
        "UPDATE feed_content SET expires_at = ?2 WHERE message_id = ?1",
        params![id, expired],
    )?;
    conn.execute("UPDATE messages SET delete_pending = 1 WHERE id = ?1", [id])?;
    Ok(())
}

fn ids(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> StoreResult<Vec<i32>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt.query_map(args, |row| row.get(0))?.collect::<Result<Vec<i32>, _>>()?;
    Ok(ids)
}

impl Database {
    // -- Sweep --

    /// Marks every message with any content expired at `now` as
    /// delete-pending. Messages already pending are skipped.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.with_tx(|conn| {
            let stale = ids(
                conn,
                "SELECT DISTINCT m.id FROM messages m
                 JOIN content_items c ON c.message_id = m.id
                 WHERE c.expires_at <= ?1 AND m.delete_pending = 0",
                [to_millis(&now)],
            )?;
            for id in &stale {
                expire_message_in(conn, *id, now)?;
                debug!(message_id = id, "message expired");
            }
            Ok(stale.len())
        })
    }

    pub fn purge_delete_pending(&self) -> StoreResult<usize> {
        self.with_tx(|conn| {
            let pending = ids(conn, "SELECT id FROM messages WHERE delete_pending = 1", [])?;
            for id in &pending {
                delete_message_in(conn, *id)?;
                debug!(message_id = id, "message purged");
            }
            Ok(pending.len())
        })
    }
}
