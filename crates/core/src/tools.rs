use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Rows returned by a query when the model does not ask for a limit.
pub const DEFAULT_QUERY_LIMIT: u32 = 10;

/// Tables the model is allowed to read. Everything else is refused at the
/// boundary before any SQL is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTable {
    Eventos,
    Clientes,
    Financeiro,
    Propostas,
    Equipe,
    Servicos,
    PacotesServicos,
}

impl QueryTable {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eventos" => Some(Self::Eventos),
            "clientes" => Some(Self::Clientes),
            "financeiro" => Some(Self::Financeiro),
            "propostas" => Some(Self::Propostas),
            "equipe" => Some(Self::Equipe),
            "servicos" => Some(Self::Servicos),
            "pacotes_servicos" => Some(Self::PacotesServicos),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eventos => "eventos",
            Self::Clientes => "clientes",
            Self::Financeiro => "financeiro",
            Self::Propostas => "propostas",
            Self::Equipe => "equipe",
            Self::Servicos => "servicos",
            Self::PacotesServicos => "pacotes_servicos",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::Eventos,
            Self::Clientes,
            Self::Financeiro,
            Self::Propostas,
            Self::Equipe,
            Self::Servicos,
            Self::PacotesServicos,
        ]
    }
}

impl std::fmt::Display for QueryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Writes the model may request. Each action maps to exactly one insert or
/// update against one fixed table; there is no free-form write path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CriarEvento,
    AtualizarEvento,
    DefinirStatusProposta,
    RegistrarDespesa,
    CriarCliente,
    AtualizarCliente,
    AlocarMembroEquipe,
}

impl ActionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "criar_evento" => Some(Self::CriarEvento),
            "atualizar_evento" => Some(Self::AtualizarEvento),
            "definir_status_proposta" => Some(Self::DefinirStatusProposta),
            "registrar_despesa" => Some(Self::RegistrarDespesa),
            "criar_cliente" => Some(Self::CriarCliente),
            "atualizar_cliente" => Some(Self::AtualizarCliente),
            "alocar_membro_equipe" => Some(Self::AlocarMembroEquipe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriarEvento => "criar_evento",
            Self::AtualizarEvento => "atualizar_evento",
            Self::DefinirStatusProposta => "definir_status_proposta",
            Self::RegistrarDespesa => "registrar_despesa",
            Self::CriarCliente => "criar_cliente",
            Self::AtualizarCliente => "atualizar_cliente",
            Self::AlocarMembroEquipe => "alocar_membro_equipe",
        }
    }

    /// The single table this action writes to.
    pub fn target_table(&self) -> &'static str {
        match self {
            Self::CriarEvento | Self::AtualizarEvento => "eventos",
            Self::DefinirStatusProposta => "propostas",
            Self::RegistrarDespesa => "financeiro",
            Self::CriarCliente | Self::AtualizarCliente => "clientes",
            Self::AlocarMembroEquipe => "alocacao_equipe",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison applied to one field of a query filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Lt,
}

impl FilterOp {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Interprets a flat field→value map from the model. String values prefixed
/// with `>` or `<` become range comparisons on the remainder; everything else
/// is an equality match.
pub fn parse_filters(raw: &Map<String, Value>) -> Vec<Filter> {
    raw.iter()
        .map(|(field, value)| {
            let (op, value) = match value.as_str() {
                Some(text) if text.starts_with('>') => {
                    (FilterOp::Gt, Value::String(text[1..].trim().to_string()))
                }
                Some(text) if text.starts_with('<') => {
                    (FilterOp::Lt, Value::String(text[1..].trim().to_string()))
                }
                _ => (FilterOp::Eq, value.clone()),
            };
            Filter { field: field.clone(), op, value }
        })
        .collect()
}

/// Static capability descriptor shared with the generation API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub const TOOL_QUERY_DATABASE: &str = "query_database";
pub const TOOL_EXECUTE_ACTION: &str = "execute_action";
pub const TOOL_SHOW_ON_MAP: &str = "show_on_map";

/// The fixed tool list offered on every generation call. Defined in code,
/// never persisted.
pub fn declarations() -> Vec<ToolDeclaration> {
    let tables: Vec<&str> = QueryTable::all().iter().map(QueryTable::as_str).collect();

    vec![
        ToolDeclaration {
            name: TOOL_QUERY_DATABASE.to_string(),
            description: "Consulta registros de uma tabela do sistema (eventos, clientes, \
                          finanças, propostas, equipe, serviços ou pacotes). Valores de filtro \
                          com prefixo > ou < fazem comparação de intervalo."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "enum": tables },
                    "filters": {
                        "type": "object",
                        "description": "Mapa campo → valor. Prefixe o valor com > ou < para comparações."
                    },
                    "limit": { "type": "integer", "description": "Máximo de registros (padrão 10)." }
                },
                "required": ["table"]
            }),
        },
        ToolDeclaration {
            name: TOOL_EXECUTE_ACTION.to_string(),
            description: "Executa uma ação de escrita no sistema: criar_evento, atualizar_evento, \
                          definir_status_proposta, registrar_despesa, criar_cliente, \
                          atualizar_cliente ou alocar_membro_equipe."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string" },
                    "payload": { "type": "object", "description": "Campos do registro alvo." }
                },
                "required": ["action", "payload"]
            }),
        },
        ToolDeclaration {
            name: TOOL_SHOW_ON_MAP.to_string(),
            description: "Exibe um local no mapa para o usuário, com uma descrição curta."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "Endereço ou nome do local." },
                    "description": { "type": "string" }
                },
                "required": ["location"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{
        declarations, parse_filters, ActionKind, FilterOp, QueryTable, DEFAULT_QUERY_LIMIT,
    };

    #[test]
    fn table_allow_list_round_trips() {
        for table in QueryTable::all() {
            assert_eq!(QueryTable::parse(table.as_str()), Some(*table));
        }
        assert_eq!(QueryTable::parse("sofia_messages"), None);
        assert_eq!(QueryTable::parse("lista_espera"), None);
    }

    #[test]
    fn unknown_action_is_refused_at_parse_time() {
        assert_eq!(ActionKind::parse("criar_evento"), Some(ActionKind::CriarEvento));
        assert_eq!(ActionKind::parse("apagar_tudo"), None);
    }

    #[test]
    fn filter_prefixes_select_range_comparisons() {
        let mut raw = Map::new();
        raw.insert("valor".to_string(), json!(">1000"));
        raw.insert("mes".to_string(), json!("11"));
        raw.insert("custo".to_string(), json!("<200"));

        let filters = parse_filters(&raw);

        let by_field = |name: &str| filters.iter().find(|f| f.field == name).unwrap();
        assert_eq!(by_field("valor").op, FilterOp::Gt);
        assert_eq!(by_field("valor").value, Value::String("1000".to_string()));
        assert_eq!(by_field("mes").op, FilterOp::Eq);
        assert_eq!(by_field("custo").op, FilterOp::Lt);
    }

    #[test]
    fn non_string_filter_values_default_to_equality() {
        let mut raw = Map::new();
        raw.insert("id_cliente".to_string(), json!(7));

        let filters = parse_filters(&raw);
        assert_eq!(filters[0].op, FilterOp::Eq);
        assert_eq!(filters[0].value, json!(7));
    }

    #[test]
    fn declarations_cover_the_three_tools() {
        let names: Vec<String> = declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["query_database", "execute_action", "show_on_map"]);
        assert_eq!(DEFAULT_QUERY_LIMIT, 10);
    }
}
