use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Metadata keys written alongside every reconciled record
pub mod metadata {
    pub const FILE_PATH: &str = "file_path";
    pub const REPO_NAME: &str = "repo_name";
    pub const CATEGORY: &str = "category";
    pub const CONTENT: &str = "content";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const START_OFFSET: &str = "start_offset";
    /// Media file a transcript chunk was cut from
    pub const VIDEO_ID: &str = "video_id";
}

/// A window of tokens cut from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenChunk {
    /// Decoded text of the window
    pub text: String,
    /// Raw token ids of the window
    pub token_ids: Vec<u32>,
    /// Offset of the first token within the document's token sequence
    pub start_offset: usize,
}

impl TokenChunk {
    /// Offset one past the last token of the window
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.token_ids.len()
    }
}

/// File-level changes between two revisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    /// (old path, new path)
    pub renamed: BTreeSet<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
    }

    /// Total number of classified changes
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len() + self.renamed.len()
    }
}

/// Organization and repository a set of paths belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub organization: String,
    pub repo_name: String,
}

impl RepoIdentity {
    pub fn new(organization: impl Into<String>, repo_name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            repo_name: repo_name.into(),
        }
    }

    /// `<organization>/<repoName>`
    pub fn repo_id(&self) -> String {
        format!("{}/{}", self.organization, self.repo_name)
    }

    /// `<organization>/<repoName>/<path>`
    pub fn qualified_id(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.organization,
            self.repo_name,
            path.trim_start_matches('/')
        )
    }

    /// Id of chunk `index` of `path`
    pub fn chunk_id(&self, path: &str, index: usize) -> String {
        format!("{}#{}", self.qualified_id(path), index)
    }

    /// Prefix shared by every chunk id of `path`
    pub fn chunk_prefix(&self, path: &str) -> String {
        format!("{}#", self.qualified_id(path))
    }
}

/// A vector plus metadata as stored in the remote index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

impl IndexRecord {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }
}

/// Deterministic id for anonymous content: lowercase hex SHA-256 of the text
pub fn content_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A nearest-neighbour hit returned by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl QueryMatch {
    pub fn field(&self, key: &str) -> &str {
        self.metadata.get(key).map(String::as_str).unwrap_or("")
    }
}

/// A path that was not upserted, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathIssue {
    pub path: String,
    pub reason: String,
}

/// Outcome of one reconciliation run. Observability only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Paths whose records were all upserted
    pub processed: Vec<String>,
    /// Paths not processed for a benign reason (absent locally, filtered out)
    pub skipped: Vec<PathIssue>,
    /// Ids submitted to the batched delete
    pub deleted: Vec<String>,
    /// Paths whose read, embed or upsert failed
    pub failed: Vec<PathIssue>,
    /// Records upserted across all processed paths
    pub records_upserted: usize,
    /// Set when the batched delete call failed
    #[serde(default)]
    pub delete_error: Option<String>,
    pub duration_ms: u64,
}

/// Work derived from a change set before any network call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Paths to read, embed and upsert: added, modified and rename targets
    pub upserts: Vec<String>,
    /// Paths whose records are removed: deleted and rename sources
    pub delete_paths: Vec<String>,
    /// Qualified ids of `delete_paths`
    pub delete_ids: Vec<String>,
    /// Paths dropped by include/exclude filtering
    pub skipped: Vec<PathIssue>,
}

/// Counts summarising a [`ReconcileReport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub processed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn counts(&self) -> ReportCounts {
        ReportCounts {
            processed: self.processed.len(),
            skipped: self.skipped.len(),
            deleted: self.deleted.len(),
            failed: self.failed.len(),
        }
    }

    /// No failed path and no delete error
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.delete_error.is_none()
    }

    pub fn is_failed(&self, path: &str) -> bool {
        self.failed.iter().any(|issue| issue.path == path)
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        self.skipped.iter().any(|issue| issue.path == path)
    }
}

/// Input to an incremental reindex of one repository
#[derive(Debug, Clone)]
pub struct ReindexRequest {
    /// Any directory inside the working tree
    pub repo_dir: PathBuf,
    /// Base revision; defaults to the cached revision, then `HEAD~1`
    pub base: Option<String>,
    /// Target revision, `HEAD` when unset
    pub head: Option<String>,
    /// Pre-computed `--name-status` output used instead of diffing with git
    pub diff_text: Option<String>,
    /// Plan only, make no service calls
    pub dry_run: bool,
}

impl ReindexRequest {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            base: None,
            head: None,
            diff_text: None,
            dry_run: false,
        }
    }
}

/// Result of a reindex: the plan, and the report when the plan was executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexSummary {
    pub repo_id: String,
    /// Revisions diffed, when the diff came from git
    pub base: Option<String>,
    pub head: Option<String>,
    /// Diff lines that could not be classified
    pub diff_errors: Vec<String>,
    pub plan: ReconcilePlan,
    pub report: Option<ReconcileReport>,
    /// Whether the revision cache now points at `head`
    pub cache_updated: bool,
}

/// A context source cited by an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub file_path: String,
    pub repo_name: String,
    pub score: f32,
}

/// Response from the question answering path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<AnswerSource>,
}
