use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row, Sqlite};

use sofia_core::tools::{Filter, FilterOp};

use super::{check_field, check_table, RepositoryError, RowStore};
use crate::DbPool;

pub struct SqlRowStore {
    pool: DbPool,
}

impl SqlRowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowStore for SqlRowStore {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        limit: u32,
    ) -> Result<Vec<Value>, RepositoryError> {
        check_table(table)?;

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT id, data, created_at FROM {table} WHERE 1 = 1"));
        for filter in filters {
            push_filter(&mut builder, filter)?;
        }
        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let raw: String = row.get("data");
                let created_at: String = row.get("created_at");
                decode_record(id, &raw, created_at)
            })
            .collect()
    }

    async fn insert(
        &self,
        table: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, RepositoryError> {
        check_table(table)?;

        let data = Value::Object(fields.clone()).to_string();
        let row = sqlx::query(&format!(
            "INSERT INTO {table} (data) VALUES (?) RETURNING id, created_at"
        ))
        .bind(&data)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        let created_at: String = row.get("created_at");
        decode_record(id, &data, created_at)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        fields: &Map<String, Value>,
    ) -> Result<u64, RepositoryError> {
        check_table(table)?;

        let patch = Value::Object(fields.clone()).to_string();
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("UPDATE {table} SET data = json_patch(data, "));
        builder.push_bind(patch);
        builder.push(") WHERE 1 = 1");
        for filter in filters {
            push_filter(&mut builder, filter)?;
        }

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Appends one `AND json_extract(...)` clause. Field names were produced by
/// the model, so they are checked to be plain identifiers before touching the
/// SQL text; values always go through bind parameters.
fn push_filter(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filter: &Filter,
) -> Result<(), RepositoryError> {
    check_field(&filter.field)?;

    match filter.op {
        FilterOp::Eq => {
            builder.push(format!(" AND json_extract(data, '$.{}') = ", filter.field));
            push_eq_value(builder, &filter.value);
        }
        FilterOp::Gt | FilterOp::Lt => {
            let raw = match &filter.value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            if let Ok(number) = raw.trim().parse::<f64>() {
                builder.push(format!(
                    " AND CAST(json_extract(data, '$.{}') AS REAL) {} ",
                    filter.field,
                    filter.op.sql_operator()
                ));
                builder.push_bind(number);
            } else {
                builder.push(format!(
                    " AND json_extract(data, '$.{}') {} ",
                    filter.field,
                    filter.op.sql_operator()
                ));
                builder.push_bind(raw);
            }
        }
    }

    Ok(())
}

fn push_eq_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::String(text) => {
            builder.push_bind(text.clone());
        }
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                builder.push_bind(integer);
            } else {
                builder.push_bind(number.as_f64().unwrap_or_default());
            }
        }
        Value::Bool(flag) => {
            builder.push_bind(*flag);
        }
        other => {
            builder.push_bind(other.to_string());
        }
    }
}

fn decode_record(id: i64, raw: &str, created_at: String) -> Result<Value, RepositoryError> {
    let mut record: Map<String, Value> = serde_json::from_str(raw)
        .map_err(|err| RepositoryError::Decode(format!("row {id} holds invalid JSON: {err}")))?;
    record.entry("id".to_string()).or_insert_with(|| Value::from(id));
    record.entry("created_at".to_string()).or_insert(Value::String(created_at));
    Ok(Value::Object(record))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use sofia_core::tools::parse_filters;

    use super::SqlRowStore;
    use crate::repositories::RowStore;
    use crate::{connect, migrations};

    async fn store() -> (crate::DbPool, SqlRowStore) {
        let pool = connect("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        (pool.clone(), SqlRowStore::new(pool))
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().expect("object literal").clone()
    }

    #[tokio::test]
    async fn insert_then_select_by_equality_filter() {
        let (pool, store) = store().await;

        store
            .insert("eventos", &fields(json!({"nome_evento": "Casamento Ana", "mes": "11"})))
            .await
            .expect("insert");
        store
            .insert("eventos", &fields(json!({"nome_evento": "Formatura Direito", "mes": "12"})))
            .await
            .expect("insert");

        let raw = fields(json!({"mes": "11"}));
        let records =
            store.select("eventos", &parse_filters(&raw), 10).await.expect("select");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["nome_evento"], "Casamento Ana");
        assert!(records[0]["id"].is_i64());

        pool.close().await;
    }

    #[tokio::test]
    async fn range_filters_compare_numerically() {
        let (pool, store) = store().await;

        for (nome, valor) in [("A", 500), ("B", 1500), ("C", 2500)] {
            store
                .insert("financeiro", &fields(json!({"descricao": nome, "valor": valor})))
                .await
                .expect("insert");
        }

        let raw = fields(json!({"valor": ">1000"}));
        let records =
            store.select("financeiro", &parse_filters(&raw), 10).await.expect("select");

        let names: Vec<&str> =
            records.iter().map(|r| r["descricao"].as_str().unwrap_or_default()).collect();
        assert_eq!(names, vec!["B", "C"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn select_honors_the_row_limit() {
        let (pool, store) = store().await;

        for n in 0..15 {
            store
                .insert("clientes", &fields(json!({"nome_cliente": format!("Cliente {n}")})))
                .await
                .expect("insert");
        }

        let records = store.select("clientes", &[], 10).await.expect("select");
        assert_eq!(records.len(), 10);

        pool.close().await;
    }

    #[tokio::test]
    async fn update_patches_matching_rows_only() {
        let (pool, store) = store().await;

        store
            .insert("propostas", &fields(json!({"nome_cliente": "Ana", "status": "pendente"})))
            .await
            .expect("insert");
        store
            .insert("propostas", &fields(json!({"nome_cliente": "Rui", "status": "pendente"})))
            .await
            .expect("insert");

        let raw = fields(json!({"nome_cliente": "Ana"}));
        let hit = store
            .update("propostas", &parse_filters(&raw), &fields(json!({"status": "aprovada"})))
            .await
            .expect("update");
        assert_eq!(hit, 1);

        let approved = fields(json!({"status": "aprovada"}));
        let records =
            store.select("propostas", &parse_filters(&approved), 10).await.expect("select");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["nome_cliente"], "Ana");

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_tables_are_refused_before_any_sql_runs() {
        let (pool, store) = store().await;

        let result = store.select("sofia_messages", &[], 10).await;
        assert!(result.is_err());

        let result = store.insert("lista_espera", &Map::new()).await;
        assert!(result.is_err());

        pool.close().await;
    }
}
