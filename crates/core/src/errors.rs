use thiserror::Error;

/// Failure taxonomy for one chat turn.
///
/// Only the generative-call variants change the HTTP status returned to the
/// caller; persistence and notification failures are best-effort by design
/// and are logged where they occur instead of propagating.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("generation credentials are not configured")]
    MissingCredentials,
    #[error("generation API rate limit hit")]
    RateLimited,
    #[error("generation API quota exhausted")]
    QuotaExceeded,
    #[error("generation API failure (status {status}): {detail}")]
    Upstream { status: u16, detail: String },
    #[error("history persistence failed: {0}")]
    Persistence(String),
    #[error("webhook notification failed: {0}")]
    Notification(String),
}

impl RelayError {
    /// HTTP status the endpoint wrapper answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimited => 429,
            Self::QuotaExceeded => 402,
            Self::MissingCredentials
            | Self::Upstream { .. }
            | Self::Persistence(_)
            | Self::Notification(_) => 500,
        }
    }

    /// User-facing message, in the interface's working language.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Requisição inválida. Verifique os campos enviados.",
            Self::RateLimited => {
                "Sofia está ocupada no momento. Tente novamente em alguns segundos."
            }
            Self::QuotaExceeded => "Limite de uso atingido. Entre em contato com o suporte.",
            Self::MissingCredentials
            | Self::Upstream { .. }
            | Self::Persistence(_)
            | Self::Notification(_) => "Desculpe, ocorreu um erro ao processar sua mensagem.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RelayError;

    #[test]
    fn rate_limit_and_quota_statuses_are_not_swapped() {
        assert_eq!(RelayError::RateLimited.http_status(), 429);
        assert_eq!(RelayError::QuotaExceeded.http_status(), 402);
    }

    #[test]
    fn upstream_failures_map_to_internal_error() {
        let error = RelayError::Upstream { status: 503, detail: "unavailable".to_string() };
        assert_eq!(error.http_status(), 500);
        assert_eq!(error.user_message(), "Desculpe, ocorreu um erro ao processar sua mensagem.");
    }

    #[test]
    fn validation_maps_to_bad_request() {
        assert_eq!(RelayError::Validation("missing message".to_string()).http_status(), 400);
    }
}
