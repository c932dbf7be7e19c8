//! Resolves the model's function calls against the row store. Table and
//! action names go through the closed enums in `sofia-core`; nothing the
//! model says can reach a table outside that vocabulary.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use sofia_core::tools::{parse_filters, ActionKind, QueryTable, DEFAULT_QUERY_LIMIT};
use sofia_db::{RepositoryError, RowStore};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool arguments: {0}")]
    BadArguments(String),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Outcome of one `query_database` call.
#[derive(Debug)]
pub struct QueryOutcome {
    pub table: QueryTable,
    pub records: Vec<Value>,
}

/// Outcome of one `execute_action` call. An unrecognized action name is a
/// normal outcome with `ok: false`, never an error.
#[derive(Debug)]
pub struct ActionOutcome {
    pub ok: bool,
    pub detail: String,
    pub record: Option<Value>,
}

impl ActionOutcome {
    fn refused(detail: impl Into<String>) -> Self {
        Self { ok: false, detail: detail.into(), record: None }
    }
}

pub struct ToolExecutor {
    rows: Arc<dyn RowStore>,
}

impl ToolExecutor {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    /// `query_database`: args `{table, filters?, limit?}`.
    pub async fn query(&self, args: &Value) -> Result<QueryOutcome, ToolError> {
        let raw_table = args
            .get("table")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::BadArguments("campo `table` ausente".to_string()))?;
        let table = QueryTable::parse(raw_table).ok_or_else(|| {
            ToolError::BadArguments(format!("tabela não reconhecida: `{raw_table}`"))
        })?;

        let empty = Map::new();
        let raw_filters = args.get("filters").and_then(Value::as_object).unwrap_or(&empty);
        let filters = parse_filters(raw_filters);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_QUERY_LIMIT, |n| n.min(u64::from(u32::MAX)) as u32);

        let records = self.rows.select(table.as_str(), &filters, limit).await?;
        Ok(QueryOutcome { table, records })
    }

    /// `execute_action`: args `{action, payload}`.
    pub async fn act(&self, args: &Value) -> Result<ActionOutcome, ToolError> {
        let raw_action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::BadArguments("campo `action` ausente".to_string()))?;

        let Some(action) = ActionKind::parse(raw_action) else {
            warn!(action = raw_action, "model requested an unknown action");
            return Ok(ActionOutcome::refused("ação não reconhecida"));
        };

        let payload = args
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| ToolError::BadArguments("campo `payload` ausente".to_string()))?;

        self.dispatch(action, payload).await
    }

    async fn dispatch(
        &self,
        action: ActionKind,
        payload: Map<String, Value>,
    ) -> Result<ActionOutcome, ToolError> {
        let table = action.target_table();
        match action {
            ActionKind::CriarEvento
            | ActionKind::CriarCliente
            | ActionKind::AlocarMembroEquipe => {
                let record = self.rows.insert(table, &payload).await?;
                Ok(ActionOutcome {
                    ok: true,
                    detail: format!("{action} concluída"),
                    record: Some(record),
                })
            }
            ActionKind::RegistrarDespesa => {
                let mut fields = payload;
                // Expenses are always outflows; an omitted status starts pending.
                fields.insert("tipo".to_string(), Value::String("saida".to_string()));
                fields
                    .entry("status".to_string())
                    .or_insert_with(|| Value::String("pendente".to_string()));
                let record = self.rows.insert(table, &fields).await?;
                Ok(ActionOutcome {
                    ok: true,
                    detail: "despesa registrada".to_string(),
                    record: Some(record),
                })
            }
            ActionKind::AtualizarEvento => self.patch(action, payload, "nome_evento").await,
            ActionKind::AtualizarCliente => self.patch(action, payload, "nome_cliente").await,
            ActionKind::DefinirStatusProposta => {
                self.patch(action, payload, "nome_cliente").await
            }
        }
    }

    /// Update actions locate their row by one fixed key of the payload; the
    /// remaining fields are the patch.
    async fn patch(
        &self,
        action: ActionKind,
        mut payload: Map<String, Value>,
        locator_field: &str,
    ) -> Result<ActionOutcome, ToolError> {
        let locator = payload.remove(locator_field).ok_or_else(|| {
            ToolError::BadArguments(format!("campo `{locator_field}` ausente em {action}"))
        })?;
        if payload.is_empty() {
            return Err(ToolError::BadArguments(format!("nenhum campo a atualizar em {action}")));
        }

        let mut selector = Map::new();
        selector.insert(locator_field.to_string(), locator);
        let filters = parse_filters(&selector);

        let hit = self.rows.update(action.target_table(), &filters, &payload).await?;
        if hit == 0 {
            Ok(ActionOutcome::refused("nenhum registro correspondente encontrado"))
        } else {
            Ok(ActionOutcome {
                ok: true,
                detail: format!("{action} concluída ({hit} registro(s))"),
                record: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use sofia_core::tools::QueryTable;
    use sofia_db::{InMemoryRowStore, RowStore};

    use super::ToolExecutor;

    fn seeded() -> (Arc<InMemoryRowStore>, ToolExecutor) {
        let store = Arc::new(InMemoryRowStore::new());
        (store.clone(), ToolExecutor::new(store))
    }

    #[tokio::test]
    async fn query_parses_table_filters_and_limit() {
        let (store, executor) = seeded();
        for mes in ["10", "11", "11"] {
            store
                .insert("eventos", json!({"mes": mes}).as_object().unwrap())
                .await
                .expect("seed");
        }

        let outcome = executor
            .query(&json!({"table": "eventos", "filters": {"mes": "11"}}))
            .await
            .expect("query");
        assert_eq!(outcome.table, QueryTable::Eventos);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn query_refuses_tables_outside_the_allow_list() {
        let (_, executor) = seeded();
        assert!(executor.query(&json!({"table": "sofia_messages"})).await.is_err());
        assert!(executor.query(&json!({"table": "lista_espera"})).await.is_err());
    }

    #[tokio::test]
    async fn unknown_action_is_refused_without_writing() {
        let (store, executor) = seeded();

        let outcome = executor
            .act(&json!({"action": "apagar_tudo", "payload": {"alvo": "eventos"}}))
            .await
            .expect("act");
        assert!(!outcome.ok);
        assert_eq!(outcome.detail, "ação não reconhecida");

        for table in ["eventos", "clientes", "financeiro", "propostas", "alocacao_equipe"] {
            assert!(store.rows(table).is_empty(), "{table} should be untouched");
        }
    }

    #[tokio::test]
    async fn registrar_despesa_forces_outflow_and_defaults_status() {
        let (store, executor) = seeded();

        let outcome = executor
            .act(&json!({
                "action": "registrar_despesa",
                "payload": {"descricao": "Aluguel de som", "valor": 800, "tipo": "entrada"}
            }))
            .await
            .expect("act");

        assert!(outcome.ok);
        let rows = store.rows("financeiro");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["tipo"], "saida");
        assert_eq!(rows[0]["status"], "pendente");
    }

    #[tokio::test]
    async fn definir_status_proposta_patches_by_client_name() {
        let (store, executor) = seeded();
        store
            .insert(
                "propostas",
                json!({"nome_cliente": "Ana", "status": "pendente"}).as_object().unwrap(),
            )
            .await
            .expect("seed");

        let outcome = executor
            .act(&json!({
                "action": "definir_status_proposta",
                "payload": {"nome_cliente": "Ana", "status": "aprovada"}
            }))
            .await
            .expect("act");

        assert!(outcome.ok);
        assert_eq!(store.rows("propostas")[0]["status"], "aprovada");
    }

    #[tokio::test]
    async fn patch_with_no_matching_row_reports_a_refusal() {
        let (_, executor) = seeded();

        let outcome = executor
            .act(&json!({
                "action": "atualizar_evento",
                "payload": {"nome_evento": "Inexistente", "status": "cancelado"}
            }))
            .await
            .expect("act");
        assert!(!outcome.ok);
    }

    #[tokio::test]
    async fn act_requires_a_payload_object() {
        let (_, executor) = seeded();
        assert!(executor.act(&json!({"action": "criar_evento"})).await.is_err());
    }
}
