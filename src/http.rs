//! Shared reqwest plumbing for the hosted service clients

use crate::error::ServiceError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest response body kept in a status error
const MAX_ERROR_BODY: usize = 500;

/// Build a client whose every request carries the given timeout
pub(crate) fn build_client(service: &str, timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::Request {
            service: service.to_string(),
            reason: format!("failed to build HTTP client: {}", e),
        })
}

/// Send a prepared request, map transport failures and non-2xx statuses
pub(crate) async fn send(
    service: &str,
    request: reqwest::RequestBuilder,
    timeout_secs: u64,
) -> Result<reqwest::Response, ServiceError> {
    let resp = request
        .send()
        .await
        .map_err(|e| ServiceError::from_reqwest(service, e, timeout_secs))?;

    let status = resp.status();
    if !status.is_success() {
        let mut body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ServiceError::Status {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(resp)
}

/// Send and decode a JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    service: &str,
    request: reqwest::RequestBuilder,
    timeout_secs: u64,
) -> Result<T, ServiceError> {
    let resp = send(service, request, timeout_secs).await?;
    resp.json::<T>()
        .await
        .map_err(|e| ServiceError::InvalidResponse {
            service: service.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(serde::Deserialize)]
    struct Pong {
        ok: bool,
    }

    #[tokio::test]
    async fn test_send_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = build_client("test", 5).unwrap();
        let pong: Pong = send_json("test", client.get(format!("{}/ping", server.uri())), 5)
            .await
            .unwrap();
        assert!(pong.ok);
    }

    #[tokio::test]
    async fn test_status_error_truncates_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("e".repeat(2000)))
            .mount(&server)
            .await;

        let client = build_client("test", 5).unwrap();
        let err = send("test", client.get(server.uri()), 5).await.unwrap_err();
        match err {
            ServiceError::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json {{"))
            .mount(&server)
            .await;

        let client = build_client("test", 5).unwrap();
        let result: Result<Pong, _> = send_json("test", client.get(server.uri()), 5).await;
        assert!(matches!(result, Err(ServiceError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let client = build_client("test", 1).unwrap();
        let err = send("test", client.get(server.uri()), 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { secs: 1, .. }));
    }
}
