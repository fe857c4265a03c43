use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use beacon_types::models::DistributionElement;

use crate::convert::{time_column, to_millis};
use crate::models::ArchiveRow;
use crate::{Database, StoreResult};

impl Database {
    // -- Archive --

    /// Appends an audit record for an accepted message. Returns its sequence number.
    pub fn append_archive(
        &self,
        de: &DistributionElement,
        body: &str,
        source_ip: &str,
        logged_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO archive
                    (message_id, distribution_id, sender_id, sent_at, source_ip, logged_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    de.message_id(),
                    de.distribution_id,
                    de.sender_id,
                    to_millis(&de.sent_at),
                    source_ip,
                    to_millis(&logged_at),
                    body,
                ],
            )?;
            let seq = conn.last_insert_rowid();
            debug!(seq, message_id = de.message_id(), source_ip, "message archived");
            Ok(seq)
        })
    }

    pub fn archive_entries(&self, message_id: i32) -> StoreResult<Vec<ArchiveRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, message_id, distribution_id, sender_id, sent_at, source_ip, logged_at, body
                 FROM archive WHERE message_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ArchiveRow {
                        seq: row.get(0)?,
                        message_id: row.get(1)?,
                        distribution_id: row.get(2)?,
                        sender_id: row.get(3)?,
                        sent_at: time_column(row, 4)?,
                        source_ip: row.get(5)?,
                        logged_at: time_column(row, 6)?,
                        body: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::message;

    #[test]
    fn archive_is_append_only_and_independent() {
        let db = Database::open_in_memory().unwrap();
        let msg = message("S1", "D1", "Report", "2024-03-01T12:00:00Z", &[("c", &[])]);
        let now = Utc::now();

        let first = db.append_archive(&msg.envelope, &msg.body, "10.0.0.1", now).unwrap();
        let second = db.append_archive(&msg.envelope, &msg.body, "10.0.0.2", now).unwrap();
        assert!(second > first);

        // Archiving never touches the cache tables.
        assert!(!db.message_exists(msg.id).unwrap());

        let entries = db.archive_entries(msg.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_ip, "10.0.0.1");
        assert_eq!(entries[1].body, msg.body);
        assert_eq!(entries[0].sender_id, "S1");
    }
}
