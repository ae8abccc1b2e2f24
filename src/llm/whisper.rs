use super::SpeechToText;
use crate::config::{OpenAiConfig, Secret};
use crate::error::{Result, ServiceError};
use crate::http;
use async_trait::async_trait;

const SERVICE: &str = "transcription";

/// Speech-to-text client for `{base_url}/audio/transcriptions`
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: Secret,
    base_url: String,
    model: String,
    language: String,
    timeout_secs: u64,
}

impl WhisperClient {
    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ServiceError::MissingCredentials("OpenAI (OPENAI_API_KEY)".to_string()))?;
        Ok(Self {
            client: http::build_client(SERVICE, config.timeout_secs)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            language: config.transcription_language.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

impl std::fmt::Debug for WhisperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String> {
        let size = audio.len();
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ServiceError::Request {
                service: SERVICE.to_string(),
                reason: e.to_string(),
            })?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "json")
            .part("file", part);

        tracing::debug!("Uploading {} ({} bytes) for transcription", filename, size);

        let request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .multipart(form);
        let parsed: WhisperResponse = http::send_json(SERVICE, request, self.timeout_secs).await?;
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> OpenAiConfig {
        OpenAiConfig {
            api_key: Some(Secret::new("sk-secret")),
            base_url,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hello there"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let whisper = WhisperClient::from_config(&config(server.uri())).unwrap();
        let text = whisper
            .transcribe(b"RIFF fake wav".to_vec(), "clip.wav")
            .await
            .unwrap();
        assert_eq!(text, "hello there");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("whisper-1"));
        assert!(body.contains("name=\"language\""));
        assert!(body.contains("clip.wav"));
    }

    #[tokio::test]
    async fn test_transcribe_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
            .mount(&server)
            .await;

        let whisper = WhisperClient::from_config(&config(server.uri())).unwrap();
        let err = whisper.transcribe(vec![0; 8], "a.mp3").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_debug_redacts_key() {
        let whisper = WhisperClient::from_config(&config("https://api.openai.com/v1".into())).unwrap();
        let debug = format!("{whisper:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("whisper-1"));
    }
}
