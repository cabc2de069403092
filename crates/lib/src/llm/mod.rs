//! Completion backend abstraction and the OpenAI-compatible client.

mod backend;
mod openai;

pub use backend::{Completion, CompletionBackend, CompletionChoice, CompletionError};
pub use openai::OpenAiClient;
