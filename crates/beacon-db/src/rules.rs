use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use beacon_types::api::SourceValueRef;
use beacon_types::hasher;

use crate::convert::{json_column, to_json};
use crate::models::RuleRow;
use crate::{Database, StoreError, StoreResult, content, feeds};

pub(crate) const RULE_COLUMNS: &str =
    "id, element_name, source_id, source_value, feed_ids, federation_uris";

pub(crate) fn map_rule(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get(0)?,
        element_name: row.get(1)?,
        source_id: row.get(2)?,
        source_value: row.get(3)?,
        feed_ids: json_column(row, 4)?,
        federation_uris: json_column(row, 5)?,
    })
}

pub(crate) fn rule_in(conn: &Connection, id: i32) -> StoreResult<Option<RuleRow>> {
    let row = conn
        .query_row(&format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1"), [id], map_rule)
        .optional()?;
    Ok(row)
}

fn require_rule(conn: &Connection, id: i32) -> StoreResult<RuleRow> {
    rule_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("rule {id}")))
}

/// The stored rule for this source pair, or a fresh inert one.
pub(crate) fn rule_or_new(
    conn: &Connection,
    element_name: &str,
    source_id: &str,
    source_value: &str,
) -> StoreResult<RuleRow> {
    let id = hasher::rule_id(source_id, source_value);
    let mut rule = rule_in(conn, id)?.unwrap_or_else(|| RuleRow {
        id,
        element_name: String::new(),
        source_id: source_id.to_string(),
        source_value: source_value.to_string(),
        feed_ids: Vec::new(),
        federation_uris: Vec::new(),
    });
    if !element_name.is_empty() {
        rule.element_name = element_name.to_string();
    }
    Ok(rule)
}

pub(crate) fn save_rule(conn: &Connection, rule: &RuleRow) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO rules (id, element_name, source_id, source_value, feed_ids, federation_uris)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            element_name = excluded.element_name,
            feed_ids = excluded.feed_ids,
            federation_uris = excluded.federation_uris",
        params![
            rule.id,
            rule.element_name,
            rule.source_id,
            rule.source_value,
            to_json(&rule.feed_ids)?,
            to_json(&rule.federation_uris)?,
        ],
    )?;
    Ok(())
}

/// Resolves feed references to ids, creating missing feeds on the way.
fn feed_ids_for(conn: &Connection, refs: &[SourceValueRef]) -> StoreResult<Vec<i32>> {
    let mut ids = Vec::with_capacity(refs.len());
    for r in refs {
        let id = hasher::feed_id(&r.id, &r.value);
        feeds::ensure_feed(conn, id, &r.id, &r.value)?;
        push_unique(&mut ids, id);
    }
    Ok(ids)
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn list_where(conn: &Connection, filter: &str) -> StoreResult<Vec<RuleRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM rules {filter} ORDER BY source_id, source_value"))?;
    let rows = stmt.query_map([], map_rule)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    // -- Rules --

    pub fn list_rules(&self) -> StoreResult<Vec<RuleRow>> {
        self.with_conn(|conn| list_where(conn, ""))
    }

    pub fn read_rule(&self, id: i32) -> StoreResult<RuleRow> {
        self.with_conn(|conn| require_rule(conn, id))
    }

    pub fn delete_rule(&self, id: i32) -> StoreResult<()> {
        self.with_tx(|conn| {
            if conn.execute("DELETE FROM rules WHERE id = ?1", [id])? == 0 {
                return Err(StoreError::NotFound(format!("rule {id}")));
            }
            content::reindex(conn)?;
            info!(rule_id = id, "rule deleted");
            Ok(())
        })
    }

    /// Refused while any message is cached, since every feed index would go stale.
    pub fn delete_all_rules(&self) -> StoreResult<usize> {
        self.with_tx(|conn| {
            let cached: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            if cached > 0 {
                return Err(StoreError::Conflict(format!(
                    "{cached} cached messages depend on the current rules"
                )));
            }
            let deleted = conn.execute("DELETE FROM rules", [])?;
            info!(deleted, "all rules deleted");
            Ok(deleted)
        })
    }

    // -- Feed rules --

    pub fn list_feed_rules(&self) -> StoreResult<Vec<RuleRow>> {
        self.with_conn(|conn| list_where(conn, "WHERE json_array_length(feed_ids) > 0"))
    }

    /// Adds feeds to the rule for `(source_id, source_value)`, creating the
    /// rule and any missing feeds.
    pub fn upsert_feed_rule(
        &self,
        element_name: &str,
        source_id: &str,
        source_value: &str,
        feeds: &[SourceValueRef],
    ) -> StoreResult<RuleRow> {
        self.with_tx(|conn| {
            let mut rule = rule_or_new(conn, element_name, source_id, source_value)?;
            for id in feed_ids_for(conn, feeds)? {
                push_unique(&mut rule.feed_ids, id);
            }
            save_rule(conn, &rule)?;
            content::reindex(conn)?;
            info!(rule_id = rule.id, feeds = rule.feed_ids.len(), "feed rule saved");
            Ok(rule)
        })
    }

    pub fn replace_rule_feeds(&self, id: i32, feeds: &[SourceValueRef]) -> StoreResult<RuleRow> {
        self.with_tx(|conn| {
            let mut rule = require_rule(conn, id)?;
            rule.feed_ids = feed_ids_for(conn, feeds)?;
            save_rule(conn, &rule)?;
            content::reindex(conn)?;
            Ok(rule)
        })
    }

    pub fn add_rule_feed(&self, id: i32, feed: &SourceValueRef) -> StoreResult<RuleRow> {
        self.with_tx(|conn| {
            let mut rule = require_rule(conn, id)?;
            for feed_id in feed_ids_for(conn, std::slice::from_ref(feed))? {
                push_unique(&mut rule.feed_ids, feed_id);
            }
            save_rule(conn, &rule)?;
            content::reindex(conn)?;
            Ok(rule)
        })
    }

    pub fn remove_rule_feed(&self, id: i32, feed: &SourceValueRef) -> StoreResult<RuleRow> {
        self.with_tx(|conn| {
            let mut rule = require_rule(conn, id)?;
            let feed_id = hasher::feed_id(&feed.id, &feed.value);
            if !rule.feed_ids.contains(&feed_id) {
                return Err(StoreError::NotFound(format!("feed {feed_id} on rule {id}")));
            }
            rule.feed_ids.retain(|f| *f != feed_id);
            save_rule(conn, &rule)?;
            content::reindex(conn)?;
            Ok(rule)
        })
    }

    /// Empties the rule's feed set and deletes those feeds.
    pub fn clear_rule_feeds(&self, id: i32) -> StoreResult<RuleRow> {
        self.with_tx(|conn| {
            let mut rule = require_rule(conn, id)?;
            for feed_id in rule.feed_ids.drain(..) {
                feeds::delete_feed_in(conn, feed_id)?;
            }
            save_rule(conn, &rule)?;
            content::reindex(conn)?;
            info!(rule_id = id, "rule feeds cleared");
            Ok(rule)
        })
    }

    // -- Federation rules --

    pub fn list_federation_rules(&self) -> StoreResult<Vec<RuleRow>> {
        self.with_conn(|conn| list_where(conn, "WHERE json_array_length(federation_uris) > 0"))
    }

    /// Adds destinations to the rule for `(source_id, source_value)`.
    /// Callers validate the URIs.
    pub fn upsert_federation_rule(
        &self,
        element_name: &str,
        source_id: &str,
        source_value: &str,
        uris: &[String],
    ) -> StoreResult<RuleRow> {
        self.with_tx(|conn| {
            let mut rule = rule_or_new(conn, element_name, source_id, source_value)?;
            for uri in uris {
                push_unique(&mut rule.federation_uris, uri.clone());
            }
            save_rule(conn, &rule)?;
            info!(rule_id = rule.id, uris = rule.federation_uris.len(), "federation rule saved");
            Ok(rule)
        })
    }

    pub fn replace_federation_uris(&self, id: i32, uris: &[String]) -> StoreResult<RuleRow> {
        self.edit_rule(id, |rule| {
            rule.federation_uris.clear();
            for uri in uris {
                push_unique(&mut rule.federation_uris, uri.clone());
            }
            Ok(())
        })
    }

    pub fn add_federation_uri(&self, id: i32, uri: &str) -> StoreResult<RuleRow> {
        self.edit_rule(id, |rule| {
            push_unique(&mut rule.federation_uris, uri.to_string());
            Ok(())
        })
    }

    pub fn remove_federation_uri(&self, id: i32, uri: &str) -> StoreResult<RuleRow> {
        self.edit_rule(id, |rule| {
            let before = rule.federation_uris.len();
            rule.federation_uris.retain(|u| u != uri);
            if rule.federation_uris.len() == before {
                return Err(StoreError::NotFound(format!("{uri} on rule {id}")));
            }
            Ok(())
        })
    }

    pub fn clear_federation_uris(&self, id: i32) -> StoreResult<RuleRow> {
        self.edit_rule(id, |rule| {
            rule.federation_uris.clear();
            Ok(())
        })
    }

    fn edit_rule<F>(&self, id: i32, edit: F) -> StoreResult<RuleRow>
    where
        F: FnOnce(&mut RuleRow) -> StoreResult<()>,
    {
        self.with_tx(|conn| {
            let mut rule = require_rule(conn, id)?;
            edit(&mut rule)?;
            save_rule(conn, &rule)?;
            Ok(rule)
        })
    }
}
