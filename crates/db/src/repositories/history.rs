use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use sofia_core::conversation::{ConversationId, Exchange};

use super::{HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn append(&self, exchange: &Exchange) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sofia_messages (id, conversation_id, user_message, sofia_response, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(exchange.conversation_id.as_str())
        .bind(&exchange.user_message)
        .bind(&exchange.assistant_reply)
        .bind(exchange.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_exchanges(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Exchange>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT conversation_id, user_message, sofia_response, created_at \
             FROM sofia_messages WHERE conversation_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(conversation_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut exchanges = rows
            .into_iter()
            .map(|row| {
                let created_raw: String = row.get("created_at");
                let created_at = parse_timestamp(&created_raw)?;
                Ok(Exchange {
                    conversation_id: ConversationId(row.get("conversation_id")),
                    user_message: row.get("user_message"),
                    assistant_reply: row.get::<Option<String>, _>("sofia_response").unwrap_or_default(),
                    created_at,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        // Fetched newest-first for the LIMIT; replay order is oldest-first.
        exchanges.reverse();
        Ok(exchanges)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| RepositoryError::Decode(format!("bad created_at `{raw}`: {err}")))
}
