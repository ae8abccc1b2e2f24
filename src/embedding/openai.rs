//! OpenAI-compatible embeddings client

use super::EmbeddingProvider;
use crate::config::{OpenAiConfig, Secret};
use crate::error::{Result, ServiceError};
use crate::http;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "embeddings";

/// Embeddings client that talks to `{base_url}/embeddings`
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: Secret,
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: Secret,
        base_url: &str,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        if api_key.expose().trim().is_empty() {
            return Err(ServiceError::MissingCredentials("OpenAI (OPENAI_API_KEY)".to_string()).into());
        }
        Ok(Self {
            client: http::build_client(SERVICE, timeout_secs)?,
            api_key,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            timeout_secs,
        })
    }

    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ServiceError::MissingCredentials("OpenAI (OPENAI_API_KEY)".to_string()))?;
        Self::new(
            api_key,
            &config.base_url,
            config.embedding_model.clone(),
            config.timeout_secs,
        )
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Requesting {} embeddings from {}", texts.len(), self.model);

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let builder = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&request);

        let mut parsed: EmbeddingResponse =
            http::send_json(SERVICE, builder, self.timeout_secs).await?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(ServiceError::InvalidResponse {
                service: SERVICE.to_string(),
                reason: format!(
                    "{} embeddings returned for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            }
            .into());
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
