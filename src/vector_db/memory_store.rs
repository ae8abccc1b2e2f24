use crate::error::{RagError, Result};
use crate::types::{IndexRecord, QueryMatch};
use crate::vector_db::VectorStore;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Vector store held in process memory
///
/// Scores are cosine similarity. Every delete call is recorded so callers can
/// observe how deletions were batched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<String, IndexRecord>>>,
    delete_calls: Arc<RwLock<Vec<Vec<String>>>>,
}

fn poisoned<T>(_: T) -> RagError {
    RagError::other("memory store lock poisoned")
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<IndexRecord> {
        self.records.read().ok()?.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Id lists passed to each `delete` call, in call order
    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.delete_calls
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let count = records.len();
        let mut store = self.records.write().map_err(poisoned)?;
        for record in records {
            store.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.delete_calls
            .write()
            .map_err(poisoned)?
            .push(ids.to_vec());
        let mut store = self.records.write().map_err(poisoned)?;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<QueryMatch>> {
        let store = self.records.read().map_err(poisoned)?;
        let mut matches: Vec<QueryMatch> = store
            .values()
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine_similarity(&vector, &record.vector),
                metadata: record.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        let store = self.records.read().map_err(poisoned)?;
        Ok(store
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord::new(id, vector, BTreeMap::new())
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = MemoryStore::new();
        store.upsert(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(vec![record("a", vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_query_orders_by_cosine() {
        let store = MemoryStore::new();
        store
            .upsert(vec![
                record("far", vec![0.0, 1.0]),
                record("near", vec![1.0, 0.1]),
                record("mid", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.query(vec![1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_delete_records_calls_and_ignores_unknown() {
        let store = MemoryStore::new();
        store
            .upsert(vec![record("a", vec![1.0]), record("b", vec![1.0])])
            .await
            .unwrap();

        store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert_eq!(store.ids(), vec!["b".to_string()]);
        assert_eq!(store.delete_calls().len(), 1);
        assert_eq!(store.delete_calls()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_list_ids_by_prefix() {
        let store = MemoryStore::new();
        store
            .upsert(vec![
                record("acme/repo/a.py#0", vec![1.0]),
                record("acme/repo/a.py#1", vec![1.0]),
                record("acme/repo/a.pyc", vec![1.0]),
            ])
            .await
            .unwrap();

        let ids = store.list_ids("acme/repo/a.py#").await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
