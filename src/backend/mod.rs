//! # Backend
//!
//! The hosted persistence/auth service, seen as tables of JSON rows.
//! Everything is async and fallible; failures carry the service's
//! human-readable message, which the app shows verbatim.
//!
//! [`RestBackend`] is the real client. Tests use an in-memory implementation.

pub mod rest;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::model::User;

pub use rest::RestBackend;

pub mod tables {
    pub const VEHICLES: &str = "vehicles";
    pub const SHIFTS: &str = "shifts";
    pub const TRANSACTIONS: &str = "transactions";
    pub const FIXED_COSTS: &str = "fixed_costs";
    pub const SETTINGS: &str = "settings";
}

/// Errors that can occur during backend calls.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Network-level failure (timeout, DNS, connection refused).
    Network(String),
    /// The service answered with an error object.
    Api { status: u16, message: String },
    /// A row did not have the expected shape.
    Decode(String),
    /// The request was refused before it was sent.
    InvalidRequest(String),
}

impl BackendError {
    /// The human-readable part, as shown to the user.
    pub fn message(&self) -> &str {
        match self {
            BackendError::Network(msg)
            | BackendError::Decode(msg)
            | BackendError::InvalidRequest(msg) => msg,
            BackendError::Api { message, .. } => message,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Network(msg) => write!(f, "network error: {msg}"),
            BackendError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            BackendError::Decode(msg) => write!(f, "decode error: {msg}"),
            BackendError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gte,
    Lte,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Row filter, ordering and limit for a table read.
/// Writes (update/delete) only use the filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(mut self, column: &str, op: FilterOp, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.to_string(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn neq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Neq, value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST-style query string pairs: `col=op.value`, `order=col.desc`, `limit=n`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.column.clone(), format!("{}.{}", f.op.as_str(), f.value)))
            .collect();
        if let Some(order) = &self.order {
            let direction = if order.descending { "desc" } else { "asc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

#[async_trait]
pub trait Backend: Send + Sync {
    /// The signed-in user, or `None` without a valid session.
    async fn current_user(&self) -> Result<Option<User>, BackendError>;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;

    /// Patches every row matching the query's filters; returns the updated rows.
    async fn update(&self, table: &str, query: &Query, patch: Value)
    -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, table: &str, query: &Query) -> Result<(), BackendError>;
}

// ============================================================================
// Typed Helpers
// ============================================================================

pub async fn fetch_all<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: &Query,
) -> Result<Vec<T>, BackendError> {
    backend
        .select(table, query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

pub async fn fetch_one<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: Query,
) -> Result<Option<T>, BackendError> {
    let rows = fetch_all(backend, table, &query.limit(1)).await?;
    Ok(rows.into_iter().next())
}

pub async fn insert_row<T: Serialize + DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    row: &T,
) -> Result<T, BackendError> {
    let stored = backend.insert(table, serde_json::to_value(row)?).await?;
    Ok(serde_json::from_value(stored)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let query = Query::new()
            .eq("user_id", "u1")
            .neq("status", "completed")
            .order_desc("started_at")
            .limit(1);
        assert_eq!(
            query.to_params(),
            vec![
                ("user_id".to_string(), "eq.u1".to_string()),
                ("status".to_string(), "neq.completed".to_string()),
                ("order".to_string(), "started_at.desc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_query_has_no_params() {
        assert!(Query::new().to_params().is_empty());
    }

    #[test]
    fn test_error_message_is_verbatim() {
        let err = BackendError::Api {
            status: 409,
            message: "duplicate key value".to_string(),
        };
        assert_eq!(err.message(), "duplicate key value");
        assert_eq!(err.to_string(), "API error (HTTP 409): duplicate key value");
    }
}
