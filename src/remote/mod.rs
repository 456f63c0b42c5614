//! Remote chat session
//!
//! A session is an opaque handle to a stateful conversation held by a hosted
//! model. Each message yields a finite, non-restartable stream of text
//! increments. A failure can surface at any point in the stream; increments
//! delivered before it stay valid.

pub mod gemini;
pub mod sse;

pub use gemini::{GeminiBackend, GeminiSession};
pub use sse::{SseEvent, SseLineParser};

use anyhow::Result;
use futures::Stream;
use std::pin::Pin;

/// Ordered text increments of one model reply
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Factory for remote conversations
pub trait ChatBackend: Send + Sync {
    fn create_session(&self, system_instruction: &str) -> Result<Box<dyn ChatSession>>;
}

/// One remote conversation
#[async_trait::async_trait]
pub trait ChatSession: Send + Sync {
    /// Send `message` and return the streamed reply
    async fn send_stream(&self, message: &str) -> Result<TextStream>;
}
