use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use sofia_core::conversation::{ConversationId, Exchange};
use sofia_core::tools::Filter;

pub mod history;
pub mod memory;
pub mod rows;

pub use history::SqlHistoryRepository;
pub use memory::{InMemoryHistoryRepository, InMemoryRowStore};
pub use rows::SqlRowStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("invalid filter field: {0}")]
    InvalidFilterField(String),
}

/// Append-only store of chat exchanges keyed by conversation identifier.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, exchange: &Exchange) -> Result<(), RepositoryError>;

    /// Up to `limit` most recent exchanges, ordered oldest to newest so they
    /// can be replayed straight into the next generation request.
    async fn recent_exchanges(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Exchange>, RepositoryError>;
}

/// Generic row access for the domain tables the tool executor touches.
/// Table names are validated against the migration schema before any SQL is
/// assembled; callers pass them from the closed enums in `sofia-core`.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        limit: u32,
    ) -> Result<Vec<Value>, RepositoryError>;

    /// Inserts one row and returns the stored record including its id.
    async fn insert(
        &self,
        table: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, RepositoryError>;

    /// Patches all rows matching `filters`; returns the number of rows hit.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        fields: &Map<String, Value>,
    ) -> Result<u64, RepositoryError>;
}

/// Tables the row store will touch. `sofia_messages` is deliberately absent:
/// history goes through `HistoryRepository` only.
pub(crate) const KNOWN_TABLES: &[&str] = &[
    "eventos",
    "clientes",
    "financeiro",
    "propostas",
    "equipe",
    "servicos",
    "pacotes_servicos",
    "alocacao_equipe",
];

pub(crate) fn check_table(table: &str) -> Result<(), RepositoryError> {
    if KNOWN_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(RepositoryError::UnknownTable(table.to_string()))
    }
}

pub(crate) fn check_field(field: &str) -> Result<(), RepositoryError> {
    let valid = !field.is_empty()
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !field.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidFilterField(field.to_string()))
    }
}
