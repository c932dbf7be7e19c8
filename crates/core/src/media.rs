use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Fixed mime type for inbound voice notes.
pub const AUDIO_MIME: &str = "audio/webm";

/// Fallback when an image data-URI carries no recognizable mime prefix.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// One user turn's payload. Exactly one kind is active per turn; size and
/// duration ceilings are enforced by the caller, not re-validated here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MediaPayload {
    Text { message: String },
    Image { base64: String, mime_type: String },
    Audio { base64: String, duration_secs: Option<f64> },
}

impl MediaPayload {
    /// Builds a payload from the wire fields of the chat request.
    ///
    /// `media_type` selects the variant; image/audio turns require
    /// `media_data` (a base64 data-URI or bare base64). An unknown
    /// `media_type` is rejected rather than silently treated as text.
    pub fn from_request(
        media_type: &str,
        message: &str,
        media_data: Option<&str>,
        audio_duration: Option<f64>,
    ) -> Result<Self, RelayError> {
        match media_type {
            "" | "text" => Ok(Self::Text { message: message.to_string() }),
            "audio" => {
                let data = media_data.ok_or_else(|| {
                    RelayError::Validation("media_data é obrigatório para áudio".to_string())
                })?;
                Ok(Self::Audio {
                    base64: strip_data_uri(data).to_string(),
                    duration_secs: audio_duration,
                })
            }
            "image" => {
                let data = media_data.ok_or_else(|| {
                    RelayError::Validation("media_data é obrigatório para imagem".to_string())
                })?;
                Ok(Self::Image {
                    base64: strip_data_uri(data).to_string(),
                    mime_type: sniff_image_mime(data),
                })
            }
            other => {
                Err(RelayError::Validation(format!("media_type desconhecido: `{other}`")))
            }
        }
    }

    /// The text persisted as the user side of the exchange. Media turns have
    /// no transcript at this point, so a fixed marker is stored instead.
    pub fn history_text(&self) -> &str {
        match self {
            Self::Text { message } => message,
            Self::Image { .. } => "[imagem enviada]",
            Self::Audio { .. } => "[áudio enviado]",
        }
    }
}

/// Drops the `data:<mime>;base64,` prefix if present; bare base64 passes
/// through untouched.
fn strip_data_uri(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Extracts `image/<subtype>` from a data-URI prefix, defaulting to JPEG.
fn sniff_image_mime(data: &str) -> String {
    let Some(rest) = data.strip_prefix("data:") else {
        return DEFAULT_IMAGE_MIME.to_string();
    };
    let Some(mime) = rest.split(';').next() else {
        return DEFAULT_IMAGE_MIME.to_string();
    };

    let valid = mime
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_lowercase()));
    if valid {
        mime.to_string()
    } else {
        DEFAULT_IMAGE_MIME.to_string()
    }
}
