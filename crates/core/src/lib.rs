//! Core domain types for the Sofia relay.
//!
//! This crate holds everything the relay and the HTTP surface share:
//!
//! - layered configuration (`config`)
//! - the error taxonomy surfaced to callers (`errors`)
//! - the two assistant personas and their system prompts (`persona`)
//! - conversation identity and exchange records (`conversation`)
//! - inbound media payloads (`media`)
//! - the closed tool/action vocabulary and declarations (`tools`)
//!
//! Nothing here performs I/O. The generative call, the row store, and the
//! webhook live in `sofia-relay` and `sofia-db`.

pub mod config;
pub mod conversation;
pub mod errors;
pub mod media;
pub mod persona;
pub mod tools;

pub use conversation::{ConversationId, Exchange};
pub use errors::RelayError;
pub use media::MediaPayload;
pub use persona::Persona;
pub use tools::{ActionKind, QueryTable};
