//! Language-model providers.
//!
//! Each client turns a `Vec<ChatMessage>` into one completed reply. The
//! [`router::ProviderRouter`] walks the configured preference list and is the
//! [`shared::agent_api::ChatBackend`] the rest of the workspace talks to.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod ollama;
pub mod openai;
pub mod router;

pub use router::ProviderRouter;
