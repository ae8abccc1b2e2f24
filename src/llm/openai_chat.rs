use super::ChatCompletion;
use crate::config::{OpenAiConfig, Secret};
use crate::error::{Result, ServiceError};
use crate::http;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "chat";

/// Chat completions client for `{base_url}/chat/completions`
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Secret,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiChat {
    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ServiceError::MissingCredentials("OpenAI (OPENAI_API_KEY)".to_string()))?;
        Ok(Self {
            client: http::build_client(SERVICE, config.timeout_secs)?,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        tracing::debug!("Calling {} with {} byte prompt", self.model, system.len() + user.len());

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body);
        let parsed: ChatResponse = http::send_json(SERVICE, request, self.timeout_secs).await?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| {
                ServiceError::InvalidResponse {
                    service: SERVICE.to_string(),
                    reason: "response carried no message content".to_string(),
                }
                .into()
            })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OpenAiConfig {
        OpenAiConfig {
            api_key: Some(Secret::new("sk-test")),
            base_url: server.uri(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_sends_system_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "max_tokens": 500,
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "who is zach?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "A data engineer."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAiChat::from_config(&config(&server)).unwrap();
        let answer = chat.complete("be brief", "who is zach?").await.unwrap();
        assert_eq!(answer, "A data engineer.");
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let chat = OpenAiChat::from_config(&config(&server)).unwrap();
        let err = chat.complete("s", "u").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Service(ServiceError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let chat = OpenAiChat::from_config(&config(&server)).unwrap();
        let err = chat.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let cfg = OpenAiConfig {
            api_key: Some(Secret::new("sk-secret")),
            ..Default::default()
        };
        let chat = OpenAiChat::from_config(&cfg).unwrap();
        assert!(!format!("{chat:?}").contains("sk-secret"));
        assert_eq!(chat.model(), "gpt-4");
    }
}
