//! Hosted language model collaborators: chat completion and speech to text

mod openai_chat;
mod whisper;

pub use openai_chat::OpenAiChat;
pub use whisper::WhisperClient;

use crate::error::Result;
use async_trait::async_trait;

/// Single-turn chat completion
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Complete a conversation of one system and one user message
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Audio transcription
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe encoded audio; `filename` carries the container format
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String>;
}
