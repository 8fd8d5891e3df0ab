//! Text-rewrite assistance backed by an OpenAI-compatible chat-completion endpoint.
//!
//! The dialogue only needs one capability: take the current session content and the user's
//! instructions and return revised content. [`TextRewriter`] is that seam.

mod openai;

pub use openai::{ChatMessage, OpenAiClient, RewriteError};

use async_trait::async_trait;

/// Revise `content` following the user's `instructions`.
#[async_trait]
pub trait TextRewriter: Send + Sync {
    async fn rewrite(&self, content: &str, instructions: &str) -> Result<String, RewriteError>;
}
