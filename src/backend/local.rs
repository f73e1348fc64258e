//! Local tabular backend on SQLite.
//!
//! Rows are JSON documents in the `records` table, keyed by table name and
//! id. Column defaults, per-branch order numbering and the unique rules the
//! hosted backend enforces are reproduced here so both backends behave the
//! same from a store's point of view.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{validate_column, Backend, Query, Table};
use crate::db::DbState;
use crate::error::{PosError, PosResult};

pub struct LocalBackend {
    db: Arc<DbState>,
}

impl LocalBackend {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db }
    }
}

// ---------------------------------------------------------------------------
// SQL helpers
// ---------------------------------------------------------------------------

fn sql_param(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Build `WHERE ...` for a table and query. Column names are validated
/// before they reach the JSON path.
fn where_clause(table: Table, query: &Query) -> PosResult<(String, Vec<SqlValue>)> {
    query.validate()?;
    let mut sql = String::from("table_name = ?1");
    let mut binds = vec![SqlValue::Text(table.as_str().to_string())];
    for filter in &query.filters {
        if filter.value.is_null() {
            sql.push_str(&format!(
                " AND json_extract(data, '$.{}') IS NULL",
                filter.column
            ));
        } else {
            binds.push(sql_param(&filter.value));
            sql.push_str(&format!(
                " AND json_extract(data, '$.{}') = ?{}",
                filter.column,
                binds.len()
            ));
        }
    }
    Ok((sql, binds))
}

fn order_clause(query: &Query) -> String {
    let mut parts: Vec<String> = query
        .order
        .iter()
        .map(|o| {
            format!(
                "json_extract(data, '$.{}') {}",
                o.column,
                if o.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect();
    parts.push("seq ASC".to_string());
    format!(" ORDER BY {}", parts.join(", "))
}

fn map_sqlite_error(table: Table, e: rusqlite::Error) -> PosError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return PosError::Backend(format!(
                "duplicate key value violates unique constraint on {}",
                table.as_str()
            ));
        }
    }
    PosError::Storage(format!("{}: {e}", table.as_str()))
}

fn load_rows(
    conn: &Connection,
    table: Table,
    query: &Query,
) -> PosResult<Vec<(String, Value)>> {
    let (where_sql, binds) = where_clause(table, query)?;
    let mut sql = format!("SELECT id, data FROM records WHERE {where_sql}");
    sql.push_str(&order_clause(query));
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql).map_err(|e| map_sqlite_error(table, e))?;
    let raw = stmt
        .query_map(params_from_iter(binds.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| map_sqlite_error(table, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlite_error(table, e))?;

    raw.into_iter()
        .map(|(id, data)| Ok((id, serde_json::from_str::<Value>(&data)?)))
        .collect()
}

fn as_object(table: Table, row: Value) -> PosResult<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        _ => Err(PosError::validation(format!(
            "Row for {} must be an object",
            table.as_str()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Column defaults
// ---------------------------------------------------------------------------

fn table_defaults(table: Table) -> Value {
    match table {
        Table::Shops => serde_json::json!({ "settings": {} }),
        Table::Branches => serde_json::json!({ "table_count": 0, "is_active": true }),
        Table::Tables => serde_json::json!({ "seats": 4, "status": "available" }),
        Table::Categories => serde_json::json!({ "sort_order": 0, "is_active": true }),
        Table::MenuItems => serde_json::json!({
            "is_available": true,
            "sort_order": 0,
            "options": [],
            "track_stock": false
        }),
        Table::Orders => serde_json::json!({ "status": "pending", "discount": 0 }),
        Table::OrderItems => serde_json::json!({ "status": "pending", "options": {} }),
        Table::ContactInquiries => serde_json::json!({ "is_read": false }),
        Table::Profiles => serde_json::json!({ "role": "owner" }),
        Table::UserPlans => serde_json::json!({
            "plan": "free",
            "max_shops": 1,
            "max_branches": 1,
            "max_menu_items": 30,
            "features": {}
        }),
    }
}

fn next_order_number(conn: &Connection, branch_id: &Value) -> PosResult<i64> {
    let next: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(CAST(json_extract(data, '$.order_number') AS INTEGER)), 0) + 1
             FROM records
             WHERE table_name = 'orders' AND json_extract(data, '$.branch_id') = ?1",
            params![sql_param(branch_id)],
            |row| row.get(0),
        )
        .map_err(|e| map_sqlite_error(Table::Orders, e))?;
    Ok(next)
}

fn fill_defaults(
    conn: &Connection,
    table: Table,
    row: &mut Map<String, Value>,
) -> PosResult<()> {
    let needs_id = row
        .get("id")
        .and_then(Value::as_str)
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    if needs_id {
        row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    if row.get("created_at").map(Value::is_null).unwrap_or(true) {
        row.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
    }
    if let Value::Object(defaults) = table_defaults(table) {
        for (key, value) in defaults {
            if row.get(&key).map(Value::is_null).unwrap_or(true) {
                row.insert(key, value);
            }
        }
    }
    if table == Table::Orders && row.get("order_number").map(Value::is_null).unwrap_or(true) {
        let branch_id = row.get("branch_id").cloned().unwrap_or(Value::Null);
        let number = next_order_number(conn, &branch_id)?;
        row.insert("order_number".into(), Value::from(number));
    }
    Ok(())
}

fn insert_one(conn: &Connection, table: Table, row: Value) -> PosResult<Value> {
    let mut map = as_object(table, row)?;
    fill_defaults(conn, table, &mut map)?;
    let id = map
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();
    let doc = Value::Object(map);
    conn.execute(
        "INSERT INTO records (table_name, id, data) VALUES (?1, ?2, ?3)",
        params![table.as_str(), id, doc.to_string()],
    )
    .map_err(|e| map_sqlite_error(table, e))?;
    Ok(doc)
}

fn write_back(conn: &Connection, table: Table, id: &str, doc: &Value) -> PosResult<()> {
    conn.execute(
        "UPDATE records SET data = ?1, updated_at = datetime('now')
         WHERE table_name = ?2 AND id = ?3",
        params![doc.to_string(), table.as_str(), id],
    )
    .map_err(|e| map_sqlite_error(table, e))?;
    Ok(())
}

fn merge_into(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(existing) = target {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            existing.insert(key.clone(), value.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Backend impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Backend for LocalBackend {
    async fn select(&self, table: Table, query: &Query) -> PosResult<Vec<Value>> {
        let conn = self.db.conn.lock()?;
        let rows = load_rows(&conn, table, query)?;
        Ok(rows.into_iter().map(|(_, data)| data).collect())
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> PosResult<Vec<Value>> {
        let mut conn = self.db.conn.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| map_sqlite_error(table, e))?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            inserted.push(insert_one(&tx, table, row)?);
        }
        tx.commit().map_err(|e| map_sqlite_error(table, e))?;
        debug!(table = table.as_str(), count = inserted.len(), "local insert");
        Ok(inserted)
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Value>,
        on_conflict: &str,
    ) -> PosResult<Vec<Value>> {
        validate_column(on_conflict)?;
        let mut conn = self.db.conn.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| map_sqlite_error(table, e))?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let map = as_object(table, row)?;
            let key = map.get(on_conflict).cloned().unwrap_or(Value::Null);
            let existing = if key.is_null() {
                Vec::new()
            } else {
                load_rows(&tx, table, &Query::new().eq(on_conflict, key).limit(1))?
            };
            match existing.into_iter().next() {
                Some((id, mut doc)) => {
                    merge_into(&mut doc, &map);
                    write_back(&tx, table, &id, &doc)?;
                    out.push(doc);
                }
                None => out.push(insert_one(&tx, table, Value::Object(map))?),
            }
        }
        tx.commit().map_err(|e| map_sqlite_error(table, e))?;
        Ok(out)
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> PosResult<Vec<Value>> {
        let patch = as_object(table, patch)?;
        let mut conn = self.db.conn.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| map_sqlite_error(table, e))?;
        let matched = load_rows(&tx, table, query)?;
        let mut updated = Vec::with_capacity(matched.len());
        for (id, mut doc) in matched {
            merge_into(&mut doc, &patch);
            write_back(&tx, table, &id, &doc)?;
            updated.push(doc);
        }
        tx.commit().map_err(|e| map_sqlite_error(table, e))?;
        if updated.is_empty() {
            warn!(table = table.as_str(), "local update matched no rows");
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, query: &Query) -> PosResult<usize> {
        let (where_sql, binds) = where_clause(table, query)?;
        let conn = self.db.conn.lock()?;
        let removed = conn
            .execute(
                &format!("DELETE FROM records WHERE {where_sql}"),
                params_from_iter(binds.iter()),
            )
            .map_err(|e| map_sqlite_error(table, e))?;
        Ok(removed)
    }
}
