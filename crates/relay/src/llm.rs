//! Wire types and client for the Gemini `generateContent` API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use sofia_core::config::GenerationConfig;
use sofia_core::errors::RelayError;
use sofia_core::tools::ToolDeclaration;

/// One generation call, as serialized to the API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationSettings,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<ToolSet>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self { role: Some(role.to_string()), parts: vec![Part::Text { text: text.into() }] }
    }
}

/// One slot of a content turn. Untagged: the active variant is picked by its
/// distinguishing key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSet {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<ToolDeclaration>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// What one generation call produced: the concatenated text parts and the
/// function calls, both in emission order.
#[derive(Clone, Debug, Default)]
pub struct ModelReply {
    pub text: String,
    pub calls: Vec<FunctionCall>,
}

impl ModelReply {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.calls.is_empty()
    }
}

/// Seam for the generation API, so the orchestration can be exercised with a
/// scripted double.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelReply, RelayError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn from_config(config: &GenerationConfig) -> Result<Self, RelayError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(RelayError::MissingCredentials);
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| RelayError::Upstream { status: 0, detail: err.to_string() })?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelReply, RelayError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.expose_secret()
        );

        debug!(model = %self.model, turns = request.contents.len(), "calling generation API");

        let response = self.http.post(&url).json(&request).send().await.map_err(|err| {
            RelayError::Upstream { status: 0, detail: format!("request failed: {err}") }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| RelayError::Upstream {
            status,
            detail: format!("failed to read response body: {err}"),
        })?;

        match status {
            429 => return Err(RelayError::RateLimited),
            402 => return Err(RelayError::QuotaExceeded),
            200..=299 => {}
            _ => {
                error!(status, "generation API returned an error");
                return Err(RelayError::Upstream { status, detail: truncate(&body, 300) });
            }
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|err| {
            RelayError::Upstream { status, detail: format!("unparseable response: {err}") }
        })?;
        if let Some(error) = parsed.error {
            return Err(RelayError::Upstream { status, detail: error.message });
        }

        Ok(collect_reply(parsed))
    }
}

/// Flattens the first candidate into text and ordered function calls. A
/// response with no candidates yields an empty reply; the caller substitutes
/// the fixed fallback.
fn collect_reply(response: GenerateResponse) -> ModelReply {
    let mut reply = ModelReply::default();
    let parts = response
        .candidates
        .and_then(|mut candidates| {
            if candidates.is_empty() {
                None
            } else {
                candidates.swap_remove(0).content
            }
        })
        .map(|content| content.parts)
        .unwrap_or_default();

    for part in parts {
        match part {
            Part::Text { text } => reply.text.push_str(&text),
            Part::FunctionCall { function_call } => reply.calls.push(function_call),
            Part::InlineData { .. } => {}
        }
    }
    reply
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{collect_reply, Content, GenerateRequest, GenerationSettings, Part};

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let request = GenerateRequest {
            contents: vec![Content::text("user", "Olá")],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::Text { text: "Você é a Sofia.".to_string() }],
            }),
            generation_config: GenerationSettings { temperature: 0.7, max_output_tokens: 2048 },
            tools: Vec::new(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("systemInstruction").is_some());
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(value["contents"][0]["role"], "user");
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn reply_concatenates_text_and_collects_calls_in_order() {
        let response = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Deixa eu verificar. " },
                        { "functionCall": { "name": "query_database", "args": { "table": "eventos" } } },
                        { "text": "Já volto." }
                    ]
                }
            }]
        }))
        .unwrap();

        let reply = collect_reply(response);
        assert_eq!(reply.text, "Deixa eu verificar. Já volto.");
        assert_eq!(reply.calls.len(), 1);
        assert_eq!(reply.calls[0].name, "query_database");
        assert_eq!(reply.calls[0].args["table"], "eventos");
    }

    #[test]
    fn empty_candidates_yield_an_empty_reply() {
        let response = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        let reply = collect_reply(response);
        assert!(reply.is_empty());
    }

    #[test]
    fn inline_data_round_trips_with_mime_type_key() {
        let part = Part::InlineData {
            inline_data: super::InlineData {
                mime_type: "audio/webm".to_string(),
                data: "AAAA".to_string(),
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["inlineData"]["mimeType"], "audio/webm");
    }
}
