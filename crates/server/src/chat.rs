//! The `/chat` endpoint: validates the request, assembles the persona prompt
//! and conversation history, runs one relay turn, then persists the exchange
//! and fires the action webhook best-effort.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use sofia_core::conversation::{ConversationId, Exchange};
use sofia_core::errors::RelayError;
use sofia_core::media::MediaPayload;
use sofia_core::persona::{system_prompt, Persona};
use sofia_db::HistoryRepository;
use sofia_relay::notifier::detect_action;
use sofia_relay::{ActionNotifier, MapPin, Notification, Relay};

/// Exchanges replayed into each generation call.
const HISTORY_WINDOW: u32 = 10;

#[derive(Clone)]
pub struct ChatState {
    pub relay: Arc<Relay>,
    pub history: Arc<dyn HistoryRepository>,
    pub notifier: Arc<ActionNotifier>,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user_email: String,
    /// Forwarded to the action webhook verbatim; no format is imposed.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub media_data: Option<String>,
    #[serde(default)]
    pub audio_duration: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapPin>,
}

/// Maps the relay failure taxonomy onto HTTP responses with the fixed
/// user-facing messages.
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.user_message(),
            "details": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

/// `Json` whose rejection answers the same `{error, details}` envelope as
/// every other failure, instead of axum's plain-text default.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(RelayError::Validation(rejection.body_text()).into()),
        }
    }
}

async fn chat(
    State(state): State<ChatState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let identity = request.user_email.trim();
    if identity.is_empty() {
        return Err(RelayError::Validation("user_email é obrigatório".to_string()).into());
    }

    let turn = MediaPayload::from_request(
        &request.media_type,
        &request.message,
        request.media_data.as_deref(),
        request.audio_duration,
    )?;
    if matches!(&turn, MediaPayload::Text { message } if message.trim().is_empty()) {
        return Err(RelayError::Validation("message é obrigatório".to_string()).into());
    }

    let now = Utc::now();
    let persona = Persona::from_context(&request.context);
    let prompt = system_prompt(persona, now);
    let conversation_id = ConversationId::derive(identity, now);

    info!(
        conversation_id = %conversation_id,
        persona = persona.as_str(),
        context = %request.context,
        media_type = %request.media_type,
        "chat turn received"
    );

    let history = match state.history.recent_exchanges(&conversation_id, HISTORY_WINDOW).await {
        Ok(exchanges) => exchanges,
        Err(error) => {
            warn!(conversation_id = %conversation_id, %error, "history unavailable, continuing without it");
            Vec::new()
        }
    };

    let output = state.relay.converse(&prompt, &history, &turn).await?;

    let exchange = Exchange {
        conversation_id: conversation_id.clone(),
        user_message: turn.history_text().to_string(),
        assistant_reply: output.reply.clone(),
        created_at: now,
    };
    if let Err(error) = state.history.append(&exchange).await {
        warn!(conversation_id = %conversation_id, %error, "failed to persist exchange");
    }

    if let Some(marker) = detect_action(&output.reply) {
        let notifier = state.notifier.clone();
        let notification = Notification::action_detected(
            exchange.user_message.clone(),
            output.reply.clone(),
            identity.to_string(),
            request.context.clone(),
            request.timestamp.unwrap_or_else(|| now.to_rfc3339()),
        );
        tokio::spawn(async move {
            if let Err(error) = notifier.dispatch(&notification).await {
                warn!(marker, %error, "action webhook dispatch failed");
            }
        });
    }

    Ok(Json(ChatResponse { reply: output.reply, map: output.map }))
}
