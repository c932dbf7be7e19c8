//! In-memory implementations used by tests and local development. They mirror
//! the SQL semantics closely enough that the tool executor cannot tell them
//! apart from the real store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use sofia_core::conversation::{ConversationId, Exchange};
use sofia_core::tools::{Filter, FilterOp};

use super::{check_field, check_table, HistoryRepository, RepositoryError, RowStore};

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    exchanges: RwLock<Vec<Exchange>>,
    fail_appends: bool,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose writes always fail, for exercising the degraded
    /// persistence path.
    pub fn failing() -> Self {
        Self { exchanges: RwLock::new(Vec::new()), fail_appends: true }
    }

    pub fn appended(&self) -> Vec<Exchange> {
        self.exchanges.read().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn append(&self, exchange: &Exchange) -> Result<(), RepositoryError> {
        if self.fail_appends {
            return Err(RepositoryError::Decode("append rejected by test double".to_string()));
        }
        let mut guard = self
            .exchanges
            .write()
            .map_err(|_| RepositoryError::Decode("history lock poisoned".to_string()))?;
        guard.push(exchange.clone());
        Ok(())
    }

    async fn recent_exchanges(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Exchange>, RepositoryError> {
        let guard = self
            .exchanges
            .read()
            .map_err(|_| RepositoryError::Decode("history lock poisoned".to_string()))?;
        let matching: Vec<Exchange> = guard
            .iter()
            .filter(|e| &e.conversation_id == conversation_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
pub struct InMemoryRowStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    next_id: AtomicI64,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(HashMap::new()), next_id: AtomicI64::new(1) }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .read()
            .ok()
            .and_then(|guard| guard.get(table).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        limit: u32,
    ) -> Result<Vec<Value>, RepositoryError> {
        check_table(table)?;
        for filter in filters {
            check_field(&filter.field)?;
        }

        let guard = self
            .tables
            .read()
            .map_err(|_| RepositoryError::Decode("row lock poisoned".to_string()))?;
        let rows = guard.get(table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|f| matches_filter(row, f)))
            .take(limit as usize)
            .collect())
    }

    async fn insert(
        &self,
        table: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, RepositoryError> {
        check_table(table)?;

        let mut record = fields.clone();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.entry("id".to_string()).or_insert_with(|| Value::from(id));
        record
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String("2025-01-01T00:00:00Z".to_string()));
        let record = Value::Object(record);

        let mut guard = self
            .tables
            .write()
            .map_err(|_| RepositoryError::Decode("row lock poisoned".to_string()))?;
        guard.entry(table.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        fields: &Map<String, Value>,
    ) -> Result<u64, RepositoryError> {
        check_table(table)?;
        for filter in filters {
            check_field(&filter.field)?;
        }

        let mut guard = self
            .tables
            .write()
            .map_err(|_| RepositoryError::Decode("row lock poisoned".to_string()))?;
        let rows = guard.entry(table.to_string()).or_default();
        let mut hit = 0u64;
        for row in rows.iter_mut() {
            if filters.iter().all(|f| matches_filter(row, f)) {
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in fields {
                        object.insert(key.clone(), value.clone());
                    }
                }
                hit += 1;
            }
        }
        Ok(hit)
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    let Some(actual) = row.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => values_equal(actual, &filter.value),
        FilterOp::Gt | FilterOp::Lt => {
            let expected = match &filter.value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            match (as_number(actual), expected.trim().parse::<f64>()) {
                (Some(left), Ok(right)) => match filter.op {
                    FilterOp::Gt => left > right,
                    _ => left < right,
                },
                _ => {
                    let left = match actual {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    match filter.op {
                        FilterOp::Gt => left > expected,
                        _ => left < expected,
                    }
                }
            }
        }
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    matches!((as_number(actual), as_number(expected)), (Some(a), Some(b)) if a == b)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
