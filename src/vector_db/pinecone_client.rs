use crate::config::{Secret, VectorDbConfig};
use crate::error::{Result, ServiceError};
use crate::http;
use crate::types::{IndexRecord, QueryMatch};
use crate::vector_db::VectorStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;

const SERVICE: &str = "pinecone";

/// Records per upsert request
const UPSERT_BATCH_SIZE: usize = 100;
/// Ids per delete request
const DELETE_BATCH_SIZE: usize = 1000;

/// Pinecone data-plane client over the REST API
///
/// The index host is taken from configuration or resolved once from the control
/// plane (`GET {control}/indexes/{name}`) on first use.
pub struct PineconeStore {
    client: reqwest::Client,
    api_key: Secret,
    index_name: String,
    control_plane_url: String,
    namespace: Option<String>,
    timeout_secs: u64,
    host: OnceCell<String>,
}

impl PineconeStore {
    pub fn new(config: &VectorDbConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ServiceError::MissingCredentials("Pinecone (PINECONE_API_KEY)".to_string()))?;

        let host = OnceCell::new_with(config.index_host.as_deref().map(normalize_host));

        Ok(Self {
            client: http::build_client(SERVICE, config.timeout_secs)?,
            api_key,
            index_name: config.index_name.clone(),
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            timeout_secs: config.timeout_secs,
            host,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                tracing::debug!("Resolving host for index {}", self.index_name);
                let url = format!("{}/indexes/{}", self.control_plane_url, self.index_name);
                let request = self.client.get(url).header("Api-Key", self.api_key.expose());
                let described: IndexDescription =
                    http::send_json(SERVICE, request, self.timeout_secs).await?;
                tracing::info!("Index {} is served from {}", self.index_name, described.host);
                Ok::<_, ServiceError>(normalize_host(&described.host))
            })
            .await?;
        Ok(host.as_str())
    }

    async fn post<B: Serialize + Sync>(&self, route: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host().await?, route);
        let request = self
            .client
            .post(url)
            .header("Api-Key", self.api_key.expose())
            .json(body);
        Ok(http::send(SERVICE, request, self.timeout_secs).await?)
    }
}

impl std::fmt::Debug for PineconeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeStore")
            .field("index_name", &self.index_name)
            .field("namespace", &self.namespace)
            .field("host", &self.host.get())
            .finish_non_exhaustive()
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Metadata values come back as arbitrary JSON; flatten them to strings
fn flatten_metadata(metadata: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, String> {
    metadata
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

#[async_trait::async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let total = records.len();
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let body = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| PineconeVector {
                        id: &r.id,
                        values: &r.vector,
                        metadata: &r.metadata,
                    })
                    .collect(),
                namespace: self.namespace.as_deref(),
            };
            let resp = self.post("/vectors/upsert", &body).await?;
            let parsed: UpsertResponse = resp.json().await.map_err(|e| ServiceError::InvalidResponse {
                service: SERVICE.to_string(),
                reason: e.to_string(),
            })?;
            tracing::debug!("Upserted {} vectors into {}", parsed.upserted_count, self.index_name);
        }
        Ok(total)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let body = DeleteRequest {
                ids: batch,
                namespace: self.namespace.as_deref(),
            };
            self.post("/vectors/delete", &body).await?;
            tracing::debug!("Deleted {} ids from {}", batch.len(), self.index_name);
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<QueryMatch>> {
        let body = QueryRequest {
            vector: &vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let resp = self.post("/query", &body).await?;
        let parsed: QueryResponse = resp.json().await.map_err(|e| ServiceError::InvalidResponse {
            service: SERVICE.to_string(),
            reason: e.to_string(),
        })?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| QueryMatch {
                id: m.id,
                score: m.score,
                metadata: flatten_metadata(m.metadata.unwrap_or_default()),
            })
            .collect())
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!("{}/vectors/list", self.host().await?);
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![("prefix", prefix)];
            if let Some(ns) = self.namespace.as_deref() {
                params.push(("namespace", ns));
            }
            if let Some(t) = token.as_deref() {
                params.push(("paginationToken", t));
            }

            let request = self
                .client
                .get(&url)
                .header("Api-Key", self.api_key.expose())
                .query(&params);
            let page: ListResponse = http::send_json(SERVICE, request, self.timeout_secs).await?;

            ids.extend(page.vectors.into_iter().map(|v| v.id));
            match page.pagination.and_then(|p| p.next) {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        Ok(ids)
    }
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedId>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct ListedId {
    id: String,
}

#[derive(Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> VectorDbConfig {
        VectorDbConfig {
            api_key: Some(Secret::new("pc-test")),
            index_host: Some(server.uri()),
            ..Default::default()
        }
    }

    fn record(id: &str) -> IndexRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("file_path".to_string(), "a.py".to_string());
        IndexRecord::new(id, vec![0.1, 0.2], metadata)
    }

    #[tokio::test]
    async fn test_upsert_sends_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(header("Api-Key", "pc-test"))
            .and(body_partial_json(serde_json::json!({
                "vectors": [{"id": "acme/repo/a.py", "metadata": {"file_path": "a.py"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"upsertedCount": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let count = store.upsert(vec![record("acme/repo/a.py")]).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_upsert_splits_large_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"upsertedCount": 100})))
            .expect(3)
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let records: Vec<IndexRecord> = (0..250).map(|i| record(&format!("id-{i}"))).collect();
        assert_eq!(store.upsert(records).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_delete_with_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/delete"))
            .and(body_json(serde_json::json!({
                "ids": ["a", "b", "c"],
                "namespace": "docs"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(&server);
        cfg.namespace = Some("docs".to_string());
        let store = PineconeStore::new(&cfg).unwrap();
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        store.delete(&ids).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_flattens_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(serde_json::json!({"topK": 20, "includeMetadata": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [
                    {"id": "x", "score": 0.91, "metadata": {"file_path": "a.py", "chunk_index": 2}},
                    {"id": "y", "score": 0.5}
                ]
            })))
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let hits = store.query(vec![0.1, 0.2], 20).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].field("file_path"), "a.py");
        assert_eq!(hits[0].field("chunk_index"), "2");
        assert!(hits[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_list_ids_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vectors/list"))
            .and(query_param("prefix", "acme/repo/a.py#"))
            .and(query_param("paginationToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vectors": [{"id": "acme/repo/a.py#2"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vectors/list"))
            .and(query_param("prefix", "acme/repo/a.py#"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vectors": [{"id": "acme/repo/a.py#0"}, {"id": "acme/repo/a.py#1"}],
                "pagination": {"next": "page2"}
            })))
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let ids = store.list_ids("acme/repo/a.py#").await.unwrap();
        assert_eq!(ids, vec!["acme/repo/a.py#0", "acme/repo/a.py#1", "acme/repo/a.py#2"]);
    }

    #[tokio::test]
    async fn test_host_resolved_from_control_plane() {
        let data_plane = MockServer::start().await;
        let control_plane = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/indexes/rag-example-index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "rag-example-index",
                "host": data_plane.uri()
            })))
            .expect(1)
            .mount(&control_plane)
            .await;
        Mock::given(method("POST"))
            .and(path("/vectors/delete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&data_plane)
            .await;

        let cfg = VectorDbConfig {
            api_key: Some(Secret::new("pc-test")),
            control_plane_url: control_plane.uri(),
            ..Default::default()
        };
        let store = PineconeStore::new(&cfg).unwrap();
        store.delete(&["a".to_string()]).await.unwrap();
        store.delete(&["b".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let err = store.delete(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Service(ServiceError::Status { status: 500, .. })
        ));
    }

    #[test]
    fn test_missing_api_key() {
        let err = PineconeStore::new(&VectorDbConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RagError::Service(ServiceError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("idx-123.svc.pinecone.io"),
            "https://idx-123.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }
}
