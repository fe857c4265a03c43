//! Named enumerations of rule terms. Registering a value also registers an
//! inert rule for it, so rules can later be attached by id.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use beacon_types::hasher;

use crate::models::SourceValueRow;
use crate::rules::{rule_in, rule_or_new, save_rule};
use crate::{Database, StoreError, StoreResult};

const VALUE_COLUMNS: &str = "id, list_id, source_id, value";

fn map_value(row: &Row<'_>) -> rusqlite::Result<SourceValueRow> {
    Ok(SourceValueRow {
        id: row.get(0)?,
        list_id: row.get(1)?,
        source_id: row.get(2)?,
        value: row.get(3)?,
    })
}

fn value_in(conn: &Connection, id: i32) -> StoreResult<Option<SourceValueRow>> {
    let row = conn
        .query_row(&format!("SELECT {VALUE_COLUMNS} FROM source_values WHERE id = ?1"), [id], map_value)
        .optional()?;
    Ok(row)
}

fn values_where(conn: &Connection, filter: &str, args: impl rusqlite::Params) -> StoreResult<Vec<SourceValueRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {VALUE_COLUMNS} FROM source_values {filter} ORDER BY source_id, value"))?;
    let rows = stmt.query_map(args, map_value)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_value(conn: &Connection, list: &str, value: &str) -> StoreResult<SourceValueRow> {
    let row = SourceValueRow {
        id: hasher::source_value_id(list, value),
        list_id: hasher::source_list_id(list),
        source_id: list.to_string(),
        value: value.to_string(),
    };
    if value_in(conn, row.id)?.is_some() {
        return Err(StoreError::Conflict(format!("value {value:?} already in list {list:?}")));
    }
    conn.execute(
        "INSERT INTO source_values (id, list_id, source_id, value) VALUES (?1, ?2, ?3, ?4)",
        params![row.id, row.list_id, row.source_id, row.value],
    )?;

    if rule_in(conn, hasher::rule_id(list, value))?.is_none() {
        save_rule(conn, &rule_or_new(conn, "", list, value)?)?;
    }
    Ok(row)
}

/// Deletes the value and its rule. Refused while the rule routes anywhere.
fn delete_value_in(conn: &Connection, row: &SourceValueRow) -> StoreResult<()> {
    let rule_id = hasher::rule_id(&row.source_id, &row.value);
    if let Some(rule) = rule_in(conn, rule_id)? {
        if !rule.is_inert() {
            return Err(StoreError::Conflict(format!(
                "value {:?} is used by an active rule",
                row.value
            )));
        }
        conn.execute("DELETE FROM rules WHERE id = ?1", [rule_id])?;
    }
    conn.execute("DELETE FROM source_values WHERE id = ?1", [row.id])?;
    Ok(())
}

impl Database {
    // -- Source values --

    /// Registers a whole list. A duplicate value rejects the entire list.
    pub fn create_value_list(&self, list: &str, values: &[String]) -> StoreResult<Vec<SourceValueRow>> {
        if list.trim().is_empty() {
            return Err(StoreError::BadRequest("list id is required".into()));
        }
        self.with_tx(|conn| {
            let rows = values
                .iter()
                .map(|value| insert_value(conn, list, value))
                .collect::<StoreResult<Vec<_>>>()?;
            info!(list, count = rows.len(), "value list created");
            Ok(rows)
        })
    }

    pub fn read_value_list(&self, list_id: i32) -> StoreResult<Vec<SourceValueRow>> {
        self.with_conn(|conn| {
            let rows = values_where(conn, "WHERE list_id = ?1", [list_id])?;
            if rows.is_empty() {
                return Err(StoreError::NotFound(format!("value list {list_id}")));
            }
            Ok(rows)
        })
    }

    pub fn delete_value_list(&self, list_id: i32) -> StoreResult<usize> {
        self.with_tx(|conn| {
            let rows = values_where(conn, "WHERE list_id = ?1", [list_id])?;
            if rows.is_empty() {
                return Err(StoreError::NotFound(format!("value list {list_id}")));
            }
            for row in &rows {
                delete_value_in(conn, row)?;
            }
            info!(list_id, count = rows.len(), "value list deleted");
            Ok(rows.len())
        })
    }

    pub fn create_value(&self, list: &str, value: &str) -> StoreResult<SourceValueRow> {
        self.with_tx(|conn| insert_value(conn, list, value))
    }

    pub fn read_value(&self, id: i32) -> StoreResult<SourceValueRow> {
        self.with_conn(|conn| value_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("value {id}"))))
    }

    pub fn delete_value(&self, id: i32) -> StoreResult<()> {
        self.with_tx(|conn| {
            let row = value_in(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("value {id}")))?;
            delete_value_in(conn, &row)
        })
    }

    pub fn list_values(&self) -> StoreResult<Vec<SourceValueRow>> {
        self.with_conn(|conn| values_where(conn, "", []))
    }

    /// Deletes every value and the inert rules registered with them. Rules
    /// that route somewhere are kept.
    pub fn delete_all_values(&self) -> StoreResult<usize> {
        self.with_tx(|conn| {
            let rows = values_where(conn, "", [])?;
            for row in &rows {
                let rule_id = hasher::rule_id(&row.source_id, &row.value);
                if rule_in(conn, rule_id)?.is_some_and(|r| r.is_inert()) {
                    conn.execute("DELETE FROM rules WHERE id = ?1", [rule_id])?;
                }
            }
            let deleted = conn.execute("DELETE FROM source_values", [])?;
            info!(deleted, "all source values deleted");
            Ok(deleted)
        })
    }
}
