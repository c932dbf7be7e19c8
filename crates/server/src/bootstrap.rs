use std::sync::Arc;

use axum::Router;
use sofia_core::config::{AppConfig, ConfigError, LoadOptions};
use sofia_core::errors::RelayError;
use sofia_db::{connect, migrations, DbPool, SqlHistoryRepository, SqlRowStore};
use sofia_relay::{ActionNotifier, GeminiClient, Relay, ToolExecutor};
use thiserror::Error;
use tracing::info;

use crate::chat::{self, ChatState};
use crate::health;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: ChatState,
}

impl Application {
    pub fn router(&self) -> Router {
        chat::router(self.state.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    let db_pool = connect(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let client = Arc::new(GeminiClient::from_config(&config.generation)?);
    let rows = Arc::new(SqlRowStore::new(db_pool.clone()));
    let relay = Arc::new(Relay::new(client, ToolExecutor::new(rows), &config.generation));
    let state = ChatState {
        relay,
        history: Arc::new(SqlHistoryRepository::new(db_pool.clone())),
        notifier: Arc::new(ActionNotifier::new(
            config.webhooks.dashboard_url.clone(),
            config.webhooks.landing_url.clone(),
        )),
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use sofia_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                generation_api_key: Some("test-key".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_generation_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("generation.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_chat_state() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('sofia_messages', 'eventos', 'propostas')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected managed tables to be available after bootstrap");
        assert_eq!(table_count, 3);

        let _ = app.router();
        app.db_pool.close().await;
    }
}
