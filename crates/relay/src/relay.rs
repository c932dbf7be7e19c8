//! One chat turn end to end: build the ordered conversation contents, call
//! the generation API, resolve any function calls sequentially, and assemble
//! the final reply text.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use sofia_core::config::GenerationConfig;
use sofia_core::conversation::Exchange;
use sofia_core::errors::RelayError;
use sofia_core::media::{MediaPayload, AUDIO_MIME};
use sofia_core::tools::{
    declarations, TOOL_EXECUTE_ACTION, TOOL_QUERY_DATABASE, TOOL_SHOW_ON_MAP,
};

use crate::llm::{
    Content, FunctionCall, GenerateRequest, GenerationSettings, GenerativeClient, InlineData,
    Part, ToolSet,
};
use crate::tools::{ToolError, ToolExecutor};

/// Instruction paired with an inline voice note.
pub const AUDIO_INSTRUCTION: &str = "Processe este áudio e responda de acordo.";

/// Instruction paired with an inline image.
pub const IMAGE_INSTRUCTION: &str =
    "Analise esta imagem e responda de acordo com as instruções da Sofia.";

/// Answer of last resort when the model produces neither text nor calls.
pub const FALLBACK_REPLY: &str = "Desculpe, não consegui processar sua mensagem.";

/// Location surfaced by a `show_on_map` invocation, passed through to the
/// HTTP response for the client to render.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct MapPin {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct ConversationOutput {
    pub reply: String,
    pub map: Option<MapPin>,
}

pub struct Relay {
    client: Arc<dyn GenerativeClient>,
    executor: ToolExecutor,
    settings: GenerationSettings,
}

impl Relay {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        executor: ToolExecutor,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            client,
            executor,
            settings: GenerationSettings {
                temperature: generation.temperature,
                max_output_tokens: generation.max_output_tokens,
            },
        }
    }

    pub async fn converse(
        &self,
        system_prompt: &str,
        history: &[Exchange],
        turn: &MediaPayload,
    ) -> Result<ConversationOutput, RelayError> {
        let request = self.build_request(system_prompt, history, turn);
        let reply = self.client.generate(request).await?;

        if reply.is_empty() {
            return Ok(ConversationOutput { reply: FALLBACK_REPLY.to_string(), map: None });
        }

        let mut text = reply.text;
        let mut map = None;
        for call in &reply.calls {
            self.resolve_call(call, &mut text, &mut map).await;
        }

        if text.trim().is_empty() {
            text = FALLBACK_REPLY.to_string();
        }
        Ok(ConversationOutput { reply: text, map })
    }

    fn build_request(
        &self,
        system_prompt: &str,
        history: &[Exchange],
        turn: &MediaPayload,
    ) -> GenerateRequest {
        let mut contents = Vec::with_capacity(history.len() * 2 + 1);
        for exchange in history {
            contents.push(Content::text("user", &exchange.user_message));
            contents.push(Content::text("model", &exchange.assistant_reply));
        }
        contents.push(encode_turn(turn));

        GenerateRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::Text { text: system_prompt.to_string() }],
            }),
            generation_config: self.settings.clone(),
            tools: vec![ToolSet { function_declarations: declarations() }],
        }
    }

    /// Executes one function call and appends its rendered block. Tool
    /// failures become visible blocks in the reply, never turn failures.
    async fn resolve_call(&self, call: &FunctionCall, text: &mut String, map: &mut Option<MapPin>) {
        match call.name.as_str() {
            TOOL_QUERY_DATABASE => match self.executor.query(&call.args).await {
                Ok(outcome) => {
                    let rendered = render_records(&outcome.records);
                    text.push_str(&format!(
                        "\n\n📋 {} registro(s) em {}:\n{rendered}",
                        outcome.records.len(),
                        outcome.table
                    ));
                }
                Err(error) => append_tool_failure(text, TOOL_QUERY_DATABASE, &error),
            },
            TOOL_EXECUTE_ACTION => match self.executor.act(&call.args).await {
                Ok(outcome) if outcome.ok => {
                    text.push_str(&format!("\n\n✅ {}", outcome.detail));
                }
                Ok(outcome) => {
                    text.push_str(&format!(
                        "\n\n⚠️ Não foi possível executar a ação: {}",
                        outcome.detail
                    ));
                }
                Err(error) => append_tool_failure(text, TOOL_EXECUTE_ACTION, &error),
            },
            TOOL_SHOW_ON_MAP => {
                let Some(location) = call.args.get("location").and_then(Value::as_str) else {
                    warn!("show_on_map call without a location");
                    return;
                };
                let description = call
                    .args
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                text.push_str(&format!("\n\n📍 {location}"));
                *map = Some(MapPin { location: location.to_string(), description });
            }
            other => {
                warn!(tool = other, "model invoked a tool that was never declared");
            }
        }
    }
}

fn encode_turn(turn: &MediaPayload) -> Content {
    let parts = match turn {
        MediaPayload::Text { message } => vec![Part::Text { text: message.clone() }],
        MediaPayload::Audio { base64, .. } => vec![
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: AUDIO_MIME.to_string(),
                    data: base64.clone(),
                },
            },
            Part::Text { text: AUDIO_INSTRUCTION.to_string() },
        ],
        MediaPayload::Image { base64, mime_type } => vec![
            Part::InlineData {
                inline_data: InlineData { mime_type: mime_type.clone(), data: base64.clone() },
            },
            Part::Text { text: IMAGE_INSTRUCTION.to_string() },
        ],
    };
    Content { role: Some("user".to_string()), parts }
}

fn render_records(records: &[Value]) -> String {
    if records.is_empty() {
        return "Nenhum registro encontrado.".to_string();
    }
    records
        .iter()
        .map(|record| serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn append_tool_failure(text: &mut String, tool: &str, error: &ToolError) {
    warn!(tool, %error, "tool execution failed");
    let shown = match error {
        ToolError::BadArguments(detail) => detail.clone(),
        ToolError::Storage(_) => "erro ao acessar os dados".to_string(),
    };
    text.push_str(&format!("\n\n⚠️ Falha em {tool}: {shown}"));
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use sofia_core::config::GenerationConfig;
    use sofia_core::conversation::{ConversationId, Exchange};
    use sofia_core::errors::RelayError;
    use sofia_core::media::MediaPayload;
    use sofia_db::{InMemoryRowStore, RowStore};

    use crate::llm::{FunctionCall, GenerateRequest, GenerativeClient, ModelReply, Part};
    use crate::tools::ToolExecutor;

    use super::{Relay, AUDIO_INSTRUCTION, FALLBACK_REPLY};

    /// Answers each call from a scripted queue and records every request.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<ModelReply, RelayError>>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedClient {
        fn with(replies: Vec<Result<ModelReply, RelayError>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies), requests: Mutex::new(Vec::new()) })
        }

        fn recorded(&self) -> Vec<GenerateRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedClient {
        async fn generate(&self, request: GenerateRequest) -> Result<ModelReply, RelayError> {
            self.requests.lock().unwrap().push(request);
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn generation_config() -> GenerationConfig {
        GenerationConfig {
            api_key: "test-key".to_string().into(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
            timeout_secs: 25,
        }
    }

    fn relay_with(
        client: Arc<ScriptedClient>,
        store: Arc<InMemoryRowStore>,
    ) -> Relay {
        Relay::new(client, ToolExecutor::new(store), &generation_config())
    }

    fn text_reply(text: &str) -> ModelReply {
        ModelReply { text: text.to_string(), calls: Vec::new() }
    }

    fn turn(message: &str) -> MediaPayload {
        MediaPayload::Text { message: message.to_string() }
    }

    #[tokio::test]
    async fn plain_reply_passes_through_with_history_pairs() {
        let client = ScriptedClient::with(vec![Ok(text_reply("Tudo certo!"))]);
        let relay = relay_with(client.clone(), Arc::new(InMemoryRowStore::new()));

        let id = ConversationId("a@example.com_2025-11-05".to_string());
        let history = vec![Exchange {
            conversation_id: id,
            user_message: "Oi".to_string(),
            assistant_reply: "Olá! Como posso ajudar?".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 11, 5, 12, 0, 0).single().unwrap(),
        }];

        let output =
            relay.converse("prompt", &history, &turn("Tem evento amanhã?")).await.unwrap();
        assert_eq!(output.reply, "Tudo certo!");
        assert!(output.map.is_none());

        let requests = client.recorded();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert!(request.system_instruction.is_some());
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));
        assert_eq!(request.tools[0].function_declarations.len(), 3);
    }

    #[tokio::test]
    async fn empty_model_output_becomes_the_fixed_fallback() {
        let client = ScriptedClient::with(vec![Ok(ModelReply::default())]);
        let relay = relay_with(client, Arc::new(InMemoryRowStore::new()));

        let output = relay.converse("prompt", &[], &turn("...")).await.unwrap();
        assert_eq!(output.reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn query_calls_append_a_rendered_block() {
        let store = Arc::new(InMemoryRowStore::new());
        store
            .insert("eventos", json!({"nome_evento": "Casamento Ana", "mes": "11"})
                .as_object()
                .unwrap())
            .await
            .expect("seed");

        let client = ScriptedClient::with(vec![Ok(ModelReply {
            text: "Encontrei o seguinte:".to_string(),
            calls: vec![FunctionCall {
                name: "query_database".to_string(),
                args: json!({"table": "eventos", "filters": {"mes": "11"}}),
            }],
        })]);
        let relay = relay_with(client, store);

        let output =
            relay.converse("prompt", &[], &turn("eventos de novembro?")).await.unwrap();
        assert!(output.reply.starts_with("Encontrei o seguinte:"));
        assert!(output.reply.contains("1 registro(s) em eventos"));
        assert!(output.reply.contains("Casamento Ana"));
    }

    #[tokio::test]
    async fn unknown_action_yields_an_error_block_and_no_write() {
        let store = Arc::new(InMemoryRowStore::new());
        let client = ScriptedClient::with(vec![Ok(ModelReply {
            text: String::new(),
            calls: vec![FunctionCall {
                name: "execute_action".to_string(),
                args: json!({"action": "apagar_tudo", "payload": {"alvo": "eventos"}}),
            }],
        })]);
        let relay = relay_with(client, store.clone());

        let output = relay.converse("prompt", &[], &turn("apaga tudo")).await.unwrap();
        assert!(output.reply.contains("ação não reconhecida"));
        assert!(store.rows("eventos").is_empty());
    }

    #[tokio::test]
    async fn show_on_map_surfaces_a_pin() {
        let client = ScriptedClient::with(vec![Ok(ModelReply {
            text: "Fica aqui:".to_string(),
            calls: vec![FunctionCall {
                name: "show_on_map".to_string(),
                args: json!({"location": "Espaço Jardim das Flores", "description": "Local do evento"}),
            }],
        })]);
        let relay = relay_with(client, Arc::new(InMemoryRowStore::new()));

        let output = relay.converse("prompt", &[], &turn("onde é?")).await.unwrap();
        let pin = output.map.expect("map pin");
        assert_eq!(pin.location, "Espaço Jardim das Flores");
        assert_eq!(pin.description.as_deref(), Some("Local do evento"));
    }

    #[tokio::test]
    async fn audio_turns_carry_one_inline_part_and_the_fixed_instruction() {
        let client = ScriptedClient::with(vec![Ok(text_reply("Entendi o áudio."))]);
        let relay = relay_with(client.clone(), Arc::new(InMemoryRowStore::new()));

        let audio = MediaPayload::Audio { base64: "AAAA".to_string(), duration_secs: Some(45.0) };
        relay.converse("prompt", &[], &audio).await.unwrap();

        let requests = client.recorded();
        let last = requests[0].contents.last().expect("turn content");
        assert_eq!(last.parts.len(), 2);
        match &last.parts[0] {
            Part::InlineData { inline_data } => {
                assert_eq!(inline_data.mime_type, "audio/webm");
                assert_eq!(inline_data.data, "AAAA");
            }
            other => panic!("expected inline data, got {other:?}"),
        }
        match &last.parts[1] {
            Part::Text { text } => assert_eq!(text, AUDIO_INSTRUCTION),
            other => panic!("expected instruction text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_errors_propagate_unchanged() {
        let client = ScriptedClient::with(vec![Err(RelayError::RateLimited)]);
        let relay = relay_with(client, Arc::new(InMemoryRowStore::new()));

        let error = relay.converse("prompt", &[], &turn("oi")).await.unwrap_err();
        assert!(matches!(error, RelayError::RateLimited));
    }
}
