// Pinecone is the hosted index the pipeline syncs into
pub mod pinecone_client;
pub use pinecone_client::PineconeStore;

// In-process store for tests and dry runs
pub mod memory_store;
pub use memory_store::MemoryStore;

use crate::error::Result;
use crate::types::{IndexRecord, QueryMatch};

/// Trait for vector store operations
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Nearest neighbours of `vector`, best first, with metadata
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<QueryMatch>>;

    /// All stored ids starting with `prefix`
    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>>;
}
