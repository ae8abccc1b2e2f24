mod openai;

pub use openai::OpenAiEmbedder;

use crate::error::{Result, ServiceError};
use async_trait::async_trait;

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single document
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            ServiceError::InvalidResponse {
                service: "embeddings".to_string(),
                reason: "no embedding returned".to_string(),
            }
            .into()
        })
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}
