//! Tabular backend abstraction.
//!
//! Every store talks to persistence through [`Backend`]: one request, one
//! response, rows as JSON objects. Two implementations exist: the hosted
//! PostgREST-style service ([`rest::RestBackend`]) and a local SQLite
//! document store ([`local::LocalBackend`]).
//!
//! Stores follow a single consistency contract: every mutation is followed by
//! a full reload of the affected collection. Nothing here patches local state
//! incrementally.

pub mod local;
pub mod rest;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PosError, PosResult};

pub use local::LocalBackend;
pub use rest::RestBackend;

/// Backend tables the stores are allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Shops,
    Branches,
    Tables,
    Categories,
    MenuItems,
    Orders,
    OrderItems,
    ContactInquiries,
    Profiles,
    UserPlans,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shops => "shops",
            Self::Branches => "branches",
            Self::Tables => "tables",
            Self::Categories => "categories",
            Self::MenuItems => "menu_items",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
            Self::ContactInquiries => "contact_inquiries",
            Self::Profiles => "profiles",
            Self::UserPlans => "user_plans",
        }
    }
}

/// Equality filter. A `Null` value means `IS NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            ascending: true,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Reject column names that could escape a JSON path or query string.
    pub(crate) fn validate(&self) -> PosResult<()> {
        for col in self
            .filters
            .iter()
            .map(|f| f.column.as_str())
            .chain(self.order.iter().map(|o| o.column.as_str()))
        {
            validate_column(col)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_column(column: &str) -> PosResult<&str> {
    if column.is_empty() || column.len() > 64 {
        return Err(PosError::validation(format!("Invalid column name: {column:?}")));
    }
    if !column
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(PosError::validation(format!("Invalid column name: {column:?}")));
    }
    Ok(column)
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, table: Table, query: &Query) -> PosResult<Vec<Value>>;

    /// Insert rows and return them as stored (ids, defaults and sequence
    /// numbers filled in). A multi-row insert is all-or-nothing.
    async fn insert(&self, table: Table, rows: Vec<Value>) -> PosResult<Vec<Value>>;

    /// Insert or merge rows keyed on `on_conflict`.
    async fn upsert(&self, table: Table, rows: Vec<Value>, on_conflict: &str)
        -> PosResult<Vec<Value>>;

    /// Merge `patch` into every row matching `query`; returns the updated rows.
    async fn update(&self, table: Table, query: &Query, patch: Value) -> PosResult<Vec<Value>>;

    async fn delete(&self, table: Table, query: &Query) -> PosResult<usize>;
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

pub fn to_row<T: Serialize>(value: &T) -> PosResult<Value> {
    let row = serde_json::to_value(value)?;
    if !row.is_object() {
        return Err(PosError::validation("Row payload must be an object"));
    }
    Ok(row)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> PosResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(PosError::from))
        .collect()
}

pub async fn fetch_rows<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    query: &Query,
) -> PosResult<Vec<T>> {
    decode_rows(backend.select(table, query).await?)
}

pub async fn fetch_one<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    query: Query,
) -> PosResult<Option<T>> {
    let rows = backend.select(table, &query.limit(1)).await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

pub async fn insert_row<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    row: Value,
) -> PosResult<T> {
    let inserted = backend.insert(table, vec![row]).await?;
    let first = inserted
        .into_iter()
        .next()
        .ok_or_else(|| PosError::Backend(format!("Insert into {} returned no row", table.as_str())))?;
    Ok(serde_json::from_value(first)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_collects_filters_and_order() {
        let q = Query::new()
            .eq("shop_id", "s1")
            .eq("category_id", Value::Null)
            .order_by("sort_order")
            .order_by_desc("created_at")
            .limit(5);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters[1].value, Value::Null);
        assert!(q.order[0].ascending);
        assert!(!q.order[1].ascending);
        assert_eq!(q.limit, Some(5));
        assert!(q.validate().is_ok());
    }

    #[test]
    fn column_names_are_restricted() {
        assert!(validate_column("table_number").is_ok());
        assert!(validate_column("data') OR 1=1 --").is_err());
        assert!(validate_column("Name").is_err());
        assert!(validate_column("").is_err());
        assert!(Query::new().order_by("a.b").validate().is_err());
    }

    #[test]
    fn to_row_rejects_non_objects() {
        assert!(to_row(&42).is_err());
        assert!(to_row(&serde_json::json!({"a": 1})).is_ok());
    }
}
