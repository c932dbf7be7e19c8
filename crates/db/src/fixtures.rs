use serde_json::Value;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Expected row counts per table after the demo dataset loads.
const SEED_COUNTS: &[(&str, i64)] = &[
    ("eventos", 3),
    ("clientes", 2),
    ("financeiro", 2),
    ("propostas", 1),
    ("equipe", 2),
    ("servicos", 2),
    ("pacotes_servicos", 2),
    ("alocacao_equipe", 1),
];

/// Fixture rows live in this id range so organic rows are never touched.
const SEED_ID_FLOOR: i64 = 9000;

/// Deterministic demo dataset for local development and end-to-end checks.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Loads the demo rows. Reloading is idempotent.
    pub async fn load(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Verifies the dataset is present and every fixture row still parses.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (table, expected) in SEED_COUNTS {
            let count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(1) FROM {table} WHERE id >= {SEED_ID_FLOOR}"
            ))
            .fetch_one(pool)
            .await?;
            checks.push((*table, count == *expected));
        }

        let rows: Vec<String> =
            sqlx::query_scalar(&format!("SELECT data FROM eventos WHERE id >= {SEED_ID_FLOOR}"))
                .fetch_all(pool)
                .await?;
        let all_parse = rows.iter().all(|raw| serde_json::from_str::<Value>(raw).is_ok());
        checks.push(("eventos-json", all_parse));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the fixture rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for (table, _) in SEED_COUNTS {
            sqlx::query(&format!("DELETE FROM {table} WHERE id >= {SEED_ID_FLOOR}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
