//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::backend::{Backend, BackendError, Filter, FilterOp, Query};
use crate::core::model::{Transaction, TxDirection, User, Vehicle, new_id};
use crate::core::notify::{Notifier, Severity};
use crate::core::store::{Field, Store};
use crate::modules::AppContext;

pub const TEST_USER: &str = "u1";

/// An in-memory backend with PostgREST-like filtering.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    /// Calls still allowed to succeed, and the error after that.
    failure: Mutex<Option<(usize, String)>>,
}

impl MemoryBackend {
    pub fn seed(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Every later call fails with a network error carrying `message`.
    pub fn fail_with(&self, message: &str) {
        self.fail_after(0, message);
    }

    /// The next `calls` calls succeed, every one after that fails.
    pub fn fail_after(&self, calls: usize, message: &str) {
        *self.failure.lock().unwrap() = Some((calls, message.to_string()));
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    fn check(&self) -> Result<(), BackendError> {
        match self.failure.lock().unwrap().as_mut() {
            Some((0, message)) => Err(BackendError::Network(message.clone())),
            Some((allowed, _)) => {
                *allowed -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn compare(row_value: &Value, filter_value: &str) -> Option<Ordering> {
    match row_value {
        Value::Number(n) => n.as_f64()?.partial_cmp(&filter_value.parse::<f64>().ok()?),
        Value::String(s) => match (
            DateTime::parse_from_rfc3339(s),
            DateTime::parse_from_rfc3339(filter_value),
        ) {
            (Ok(a), Ok(b)) => Some(a.cmp(&b)),
            _ => Some(s.as_str().cmp(filter_value)),
        },
        Value::Bool(b) => Some(b.to_string().as_str().cmp(filter_value)),
        _ => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match b {
        Value::String(s) => compare(a, s),
        Value::Null => None,
        other => compare(a, &other.to_string()),
    }
    .unwrap_or(Ordering::Equal)
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let ordering = row
        .get(&filter.column)
        .and_then(|v| compare(v, &filter.value));
    match filter.op {
        FilterOp::Eq => ordering == Some(Ordering::Equal),
        FilterOp::Neq => ordering != Some(Ordering::Equal),
        FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}

fn matches_all(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|f| matches(row, f))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        self.check()?;
        Ok(Some(User {
            id: TEST_USER.to_string(),
            email: Some("driver@example.com".to_string()),
        }))
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.check()?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| matches_all(row, query))
            .collect();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.descending { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        self.check()?;
        self.seed(table, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.check()?;
        let Value::Object(patch) = patch else {
            return Err(BackendError::InvalidRequest("patch must be an object".into()));
        };
        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if !matches_all(row, query) {
                continue;
            }
            if let Value::Object(fields) = row {
                for (key, value) in &patch {
                    fields.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), BackendError> {
        self.check()?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| !matches_all(row, query));
        }
        Ok(())
    }
}

/// Keeps every notification for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}

/// A context signed in as [`TEST_USER`] over an empty [`MemoryBackend`].
pub fn test_context() -> (Arc<AppContext>, Arc<MemoryBackend>, Arc<RecordingNotifier>) {
    let backend = Arc::new(MemoryBackend::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(Store::new());
    store.set(Field::User(Some(User {
        id: TEST_USER.to_string(),
        email: None,
    })));
    let ctx = Arc::new(AppContext::new(backend.clone(), store, notifier.clone()));
    (ctx, backend, notifier)
}

pub fn vehicle(id: &str, vehicle_type: &str, weekly_cost: f64) -> Vehicle {
    Vehicle {
        id: id.to_string(),
        user_id: TEST_USER.to_string(),
        name: format!("Car {id}"),
        vehicle_type: vehicle_type.to_string(),
        weekly_cost,
        monthly_wash_cost: 0.0,
    }
}

pub fn tx(shift_id: &str, direction: TxDirection, amount: f64) -> Transaction {
    Transaction {
        id: new_id(),
        user_id: TEST_USER.to_string(),
        shift_id: Some(shift_id.to_string()),
        direction,
        kind: "other".to_string(),
        amount,
        volume: None,
        odometer: None,
        note: None,
        created_at: Utc::now(),
    }
}
