//! Incremental reconciliation of a change set against the vector store
//!
//! Planning is pure. Execution reads, embeds and upserts each path with bounded
//! fan-out, then submits every accumulated deletion in a single batched call.
//! Per-path failures are recorded in the report and never abort the run.

use crate::embedding::EmbeddingProvider;
use crate::error::ReadError;
use crate::glob_utils::PathFilter;
use crate::indexer::{FileReader, TokenChunker};
use crate::types::{
    ChangeSet, IndexRecord, PathIssue, ReconcilePlan, ReconcileReport, RepoIdentity, metadata,
};
use crate::vector_db::VectorStore;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Per-path result of the upsert phase
#[derive(Debug)]
enum FileOutcome {
    Processed {
        path: String,
        records: Vec<String>,
        stale_ids: Vec<String>,
    },
    Skipped {
        issue: PathIssue,
        stale_ids: Vec<String>,
    },
    Failed(PathIssue),
}

fn issue(path: &str, reason: impl Into<String>) -> PathIssue {
    PathIssue {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Split a change set into upserts and deletions without touching any service
///
/// Renames become a delete of the old path plus an upsert of the new one. A path
/// that is both upserted and deleted (e.g. re-added after being renamed away) is
/// only upserted.
pub fn plan_changes(identity: &RepoIdentity, filter: &PathFilter, changes: &ChangeSet) -> ReconcilePlan {
    let mut upserts = BTreeSet::new();
    let mut skipped = Vec::new();

    let candidates = changes
        .added
        .iter()
        .chain(changes.modified.iter())
        .chain(changes.renamed.iter().map(|(_, new)| new));
    for path in candidates {
        match filter.rejection(path) {
            Some(reason) => {
                tracing::debug!("Skipping {}: {}", path, reason);
                skipped.push(issue(path, reason));
            }
            None => {
                upserts.insert(path.clone());
            }
        }
    }

    let delete_paths: BTreeSet<String> = changes
        .deleted
        .iter()
        .chain(changes.renamed.iter().map(|(old, _)| old))
        .filter(|path| !upserts.contains(*path))
        .cloned()
        .collect();
    let delete_ids = delete_paths
        .iter()
        .map(|path| identity.qualified_id(path))
        .collect();

    ReconcilePlan {
        upserts: upserts.into_iter().collect(),
        delete_paths: delete_paths.into_iter().collect(),
        delete_ids,
        skipped,
    }
}

/// Applies a [`ChangeSet`] to a vector store
///
/// File granularity stores one record per file under its qualified id. With a
/// chunker attached, each chunk is stored as `<qualified id>#<n>`; vanished
/// chunks and any record left from file granularity are deleted.
pub struct Reconciler {
    identity: RepoIdentity,
    reader: Arc<dyn FileReader>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunker: Option<TokenChunker>,
    filter: PathFilter,
    category: String,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        identity: RepoIdentity,
        reader: Arc<dyn FileReader>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            identity,
            reader,
            embedder,
            store,
            chunker: None,
            filter: PathFilter::allow_all(),
            category: "Github".to_string(),
            concurrency: 4,
        }
    }

    /// Store one record per token window instead of one per file
    pub fn with_chunker(mut self, chunker: TokenChunker) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Maximum number of paths processed at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn identity(&self) -> &RepoIdentity {
        &self.identity
    }

    /// Split a change set into upserts and deletions
    pub fn plan(&self, changes: &ChangeSet) -> ReconcilePlan {
        plan_changes(&self.identity, &self.filter, changes)
    }

    /// Reconcile `changes` and report what happened
    pub async fn reconcile(&self, changes: &ChangeSet) -> ReconcileReport {
        let plan = self.plan(changes);
        self.execute(&plan).await
    }

    /// Execute a previously computed plan
    pub async fn execute(&self, plan: &ReconcilePlan) -> ReconcileReport {
        let start = Instant::now();
        let mut report = ReconcileReport {
            skipped: plan.skipped.clone(),
            ..Default::default()
        };

        tracing::info!(
            "Reconciling {}: {} paths to upsert, {} paths to delete",
            self.identity.repo_id(),
            plan.upserts.len(),
            plan.delete_paths.len()
        );

        let outcomes: Vec<FileOutcome> = stream::iter(plan.upserts.iter())
            .map(|path| self.process_path(path))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut written: BTreeSet<String> = BTreeSet::new();
        let mut deletions: BTreeSet<String> = BTreeSet::new();

        for outcome in outcomes {
            match outcome {
                FileOutcome::Processed {
                    path,
                    records,
                    stale_ids,
                } => {
                    report.records_upserted += records.len();
                    written.extend(records);
                    deletions.extend(stale_ids);
                    report.processed.push(path);
                }
                FileOutcome::Skipped { issue, stale_ids } => {
                    deletions.extend(stale_ids);
                    report.skipped.push(issue);
                }
                FileOutcome::Failed(issue) => report.failed.push(issue),
            }
        }

        // Deleted and renamed-away paths
        match &self.chunker {
            None => deletions.extend(plan.delete_ids.iter().cloned()),
            Some(_) => {
                for path in &plan.delete_paths {
                    match self.stored_ids(path).await {
                        Ok(ids) => deletions.extend(ids),
                        Err(e) => {
                            tracing::warn!("Failed to list stored ids for {}: {}", path, e);
                            report
                                .failed
                                .push(issue(path, format!("listing stored ids failed: {}", e)));
                        }
                    }
                }
            }
        }

        let delete_ids: Vec<String> = deletions
            .into_iter()
            .filter(|id| !written.contains(id))
            .collect();

        if delete_ids.is_empty() {
            tracing::debug!("Nothing to delete");
        } else {
            tracing::info!("Deleting {} ids in one batch", delete_ids.len());
            if let Err(e) = self.store.delete(&delete_ids).await {
                tracing::warn!("Batched delete of {} ids failed: {}", delete_ids.len(), e);
                report.delete_error = Some(e.to_string());
            }
            report.deleted = delete_ids;
        }

        report.processed.sort();
        report.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        report.failed.sort_by(|a, b| a.path.cmp(&b.path));
        report.duration_ms = start.elapsed().as_millis() as u64;

        let counts = report.counts();
        tracing::info!(
            "Reconciled {} in {} ms: {} processed, {} skipped, {} deleted, {} failed",
            self.identity.repo_id(),
            report.duration_ms,
            counts.processed,
            counts.skipped,
            counts.deleted,
            counts.failed
        );

        report
    }

    async fn process_path(&self, path: &str) -> FileOutcome {
        let content = match self.reader.read(path).await {
            Ok(content) => content,
            Err(ReadError::NotFound(_)) => {
                tracing::warn!("Skipping {}: not present in the working tree", path);
                return FileOutcome::Skipped {
                    issue: issue(path, "file not found"),
                    stale_ids: Vec::new(),
                };
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path, e);
                return FileOutcome::Failed(issue(path, e.to_string()));
            }
        };

        match &self.chunker {
            None => self.process_file(path, content).await,
            Some(chunker) => self.process_chunks(path, &content, chunker).await,
        }
    }

    /// Ids stored for `path` under either granularity: the bare qualified id and its chunks
    async fn stored_ids(&self, path: &str) -> crate::error::Result<Vec<String>> {
        let id = self.identity.qualified_id(path);
        let chunk_prefix = self.identity.chunk_prefix(path);
        let ids = self.store.list_ids(&id).await?;
        Ok(ids
            .into_iter()
            .filter(|candidate| *candidate == id || candidate.starts_with(&chunk_prefix))
            .collect())
    }

    fn base_metadata(&self, path: &str, content: String) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert(metadata::FILE_PATH.to_string(), path.to_string());
        meta.insert(metadata::REPO_NAME.to_string(), self.identity.repo_id());
        meta.insert(metadata::CATEGORY.to_string(), self.category.clone());
        meta.insert(metadata::CONTENT.to_string(), content);
        meta
    }

    async fn process_file(&self, path: &str, content: String) -> FileOutcome {
        let id = self.identity.qualified_id(path);

        if content.trim().is_empty() {
            tracing::debug!("{} is empty, removing its record", path);
            return FileOutcome::Skipped {
                issue: issue(path, "empty file"),
                stale_ids: vec![id],
            };
        }

        let vector = match self.embedder.embed(&content).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("Failed to embed {}: {}", path, e);
                return FileOutcome::Failed(issue(path, format!("embedding failed: {}", e)));
            }
        };

        let record = IndexRecord::new(id.clone(), vector, self.base_metadata(path, content));
        if let Err(e) = self.store.upsert(vec![record]).await {
            tracing::warn!("Failed to upsert {}: {}", path, e);
            return FileOutcome::Failed(issue(path, format!("upsert failed: {}", e)));
        }

        tracing::debug!("Upserted {} as {}", path, id);
        FileOutcome::Processed {
            path: path.to_string(),
            records: vec![id],
            stale_ids: Vec::new(),
        }
    }

    async fn process_chunks(&self, path: &str, content: &str, chunker: &TokenChunker) -> FileOutcome {
        let chunks = match chunker.chunk(content) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Failed to chunk {}: {}", path, e);
                return FileOutcome::Failed(issue(path, e.to_string()));
            }
        };

        // Listed before writing so that stale tails can be told apart from new chunks
        let existing = match self.stored_ids(path).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Failed to list existing chunks of {}: {}", path, e);
                Vec::new()
            }
        };

        if chunks.is_empty() {
            return FileOutcome::Skipped {
                issue: issue(path, "empty file"),
                stale_ids: existing,
            };
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = match self.embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == chunks.len() => vectors,
            Ok(vectors) => {
                let reason = format!(
                    "embedding failed: {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                );
                tracing::warn!("Failed to embed {}: {}", path, reason);
                return FileOutcome::Failed(issue(path, reason));
            }
            Err(e) => {
                tracing::warn!("Failed to embed {}: {}", path, e);
                return FileOutcome::Failed(issue(path, format!("embedding failed: {}", e)));
            }
        };

        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (chunk, vector))| {
                let mut meta = self.base_metadata(path, chunk.text);
                meta.insert(metadata::CHUNK_INDEX.to_string(), index.to_string());
                meta.insert(
                    metadata::START_OFFSET.to_string(),
                    chunk.start_offset.to_string(),
                );
                IndexRecord::new(self.identity.chunk_id(path, index), vector, meta)
            })
            .collect();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        if let Err(e) = self.store.upsert(records).await {
            tracing::warn!("Failed to upsert {}: {}", path, e);
            return FileOutcome::Failed(issue(path, format!("upsert failed: {}", e)));
        }

        let current: BTreeSet<&String> = ids.iter().collect();
        let stale_ids: Vec<String> = existing
            .into_iter()
            .filter(|id| !current.contains(id))
            .collect();
        if !stale_ids.is_empty() {
            tracing::debug!("{} shrank, {} stale chunks", path, stale_ids.len());
        }

        tracing::debug!("Upserted {} chunks of {}", ids.len(), path);
        FileOutcome::Processed {
            path: path.to_string(),
            records: ids,
            stale_ids,
        }
    }
}
