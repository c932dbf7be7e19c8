//! Webhook notifier for detected actions. A reply that mentions one of the
//! fixed action markers triggers a best-effort POST to the dashboard or
//! landing webhook, depending on where the conversation came from.

use serde::Serialize;
use tracing::{debug, warn};

use sofia_core::errors::RelayError;
use sofia_core::persona::OWNER_CONTEXT_TAG;

/// Markers the original automation flow reacts to. Both the snake_case tool
/// vocabulary and the natural-language phrasings the model tends to produce.
const ACTION_KEYWORDS: &[&str] = &[
    "agenda_bloqueada",
    "block_date",
    "data bloqueada",
    "proposta_aprovada",
    "approve_proposal",
    "proposta aceita",
    "despesa_adicionada",
    "add_expense",
    "despesa registrada",
    "contrato_enviado",
    "send_contract",
    "contrato gerado",
    "reuniao_agendada",
    "schedule_meeting",
    "reunião marcada",
];

/// Returns the first marker the reply mentions, case-insensitively.
pub fn detect_action(reply: &str) -> Option<&'static str> {
    let haystack = reply.to_lowercase();
    ACTION_KEYWORDS.iter().copied().find(|keyword| haystack.contains(keyword))
}

#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub action: &'static str,
    pub message: String,
    pub sofia_response: String,
    pub user_email: String,
    /// Forwarded verbatim from the request; no format is imposed on callers.
    pub timestamp: String,
    pub context: String,
}

impl Notification {
    pub fn action_detected(
        message: String,
        sofia_response: String,
        user_email: String,
        context: String,
        timestamp: String,
    ) -> Self {
        Self {
            action: "sofia_action_detected",
            message,
            sofia_response,
            user_email,
            timestamp,
            context,
        }
    }
}

pub struct ActionNotifier {
    http: reqwest::Client,
    dashboard_url: Option<String>,
    landing_url: Option<String>,
}

impl ActionNotifier {
    pub fn new(dashboard_url: Option<String>, landing_url: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), dashboard_url, landing_url }
    }

    /// Delivers one notification. Callers spawn this after the reply is
    /// final and log the error; a webhook outage never reaches the user.
    pub async fn dispatch(&self, notification: &Notification) -> Result<(), RelayError> {
        let url = if notification.context == OWNER_CONTEXT_TAG {
            self.dashboard_url.as_deref()
        } else {
            self.landing_url.as_deref()
        };
        let Some(url) = url else {
            debug!(context = %notification.context, "no webhook configured, skipping");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|err| RelayError::Notification(err.to_string()))?;

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "webhook answered with an error");
            return Err(RelayError::Notification(format!(
                "webhook status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{detect_action, Notification};

    #[test]
    fn markers_are_detected_case_insensitively() {
        assert_eq!(
            detect_action("Pronto! Proposta_Aprovada para o cliente."),
            Some("proposta_aprovada")
        );
        assert_eq!(detect_action("Despesa registrada com sucesso."), Some("despesa registrada"));
        assert_eq!(detect_action("Reunião marcada para sexta."), Some("reunião marcada"));
    }

    #[test]
    fn ordinary_replies_trigger_nothing() {
        assert_eq!(detect_action("Temos dois eventos em novembro."), None);
        assert_eq!(detect_action(""), None);
    }

    #[test]
    fn payload_carries_the_fixed_action_marker() {
        let notification = Notification::action_detected(
            "bloqueia o dia 12".to_string(),
            "agenda_bloqueada para 12/11".to_string(),
            "filipe@gmproducoes.com".to_string(),
            "private_dashboard".to_string(),
            "12/11/2025 14:30".to_string(),
        );
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["action"], "sofia_action_detected");
        assert_eq!(value["user_email"], "filipe@gmproducoes.com");
        // whatever the caller sent is forwarded untouched
        assert_eq!(value["timestamp"], "12/11/2025 14:30");
    }
}
