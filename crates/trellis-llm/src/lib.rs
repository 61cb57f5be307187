//! # Trellis LLM
//!
//! Model providers and the routing layer above them:
//! - [`providers`]: Ollama (local), OpenAI (remote), and a scriptable mock
//! - [`LlmManager`]: per-stage provider routing, privacy enforcement,
//!   timeouts, bounded retries, and per-call cost records
//! - [`pricing`]: per-1k-token cost table
//!
//! Privacy routing is absolute: content carrying a sensitive tag only ever
//! reaches providers whose `is_local()` is true.

pub mod error;
pub mod manager;
pub mod pricing;
pub mod providers;

pub use error::LlmError;
pub use manager::LlmManager;
pub use providers::{MockProvider, OllamaProvider, OpenAiProvider};
