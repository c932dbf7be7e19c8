//! Generative relay: the Gemini wire client, the tool executor that resolves
//! the model's function calls against the row store, the webhook notifier,
//! and the `converse` orchestration tying them together.

pub mod llm;
pub mod notifier;
pub mod relay;
pub mod tools;

pub use llm::{GeminiClient, GenerativeClient, ModelReply};
pub use notifier::{ActionNotifier, Notification};
pub use relay::{ConversationOutput, MapPin, Relay};
pub use tools::ToolExecutor;
