//! Core library client for rag-sync
//!
//! [`RagClient`] wires the hosted collaborators built from a [`Config`] and exposes
//! every operation the binary offers: incremental reindexing from a git diff,
//! retrieval answers, ad hoc upserts, chunking and transcription.

mod reconcile;
pub mod retrieval;

pub use reconcile::{Reconciler, plan_changes};

use crate::config::{Config, Granularity};
use crate::embedding::{EmbeddingProvider, OpenAiEmbedder};
use crate::error::{ConfigError, RagError, ReadError, Result, ValidationError};
use crate::git::{GitRepository, GitTreeReader, RevisionDiff, parse_name_status};
use crate::glob_utils::PathFilter;
use crate::github::GitHubClient;
use crate::indexer::{FileReader, LocalFileReader, TiktokenTokenizer, TokenChunker};
use crate::llm::{ChatCompletion, OpenAiChat, SpeechToText, WhisperClient};
use crate::revision_cache::RevisionCache;
use crate::types::{
    AskResponse, IndexRecord, RepoIdentity, ReindexRequest, ReindexSummary, TokenChunk,
    content_id, metadata,
};
use crate::vector_db::{PineconeStore, VectorStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where the change set of a reindex run came from
struct DiffSource {
    identity: RepoIdentity,
    /// Content of changed paths: the `head` tree for git diffs, the working tree otherwise
    reader: Arc<dyn FileReader>,
    base: Option<String>,
    head: Option<String>,
    diff_text: String,
    /// Revisions were resolved from git, so `head` may be recorded in the cache
    from_git: bool,
}

/// Main client for the sync pipeline
///
/// # Example
///
/// ```no_run
/// use rag_sync::{Config, RagClient, ReindexRequest};
///
/// #[tokio::main]
/// async fn main() -> rag_sync::Result<()> {
///     let client = RagClient::from_config(Config::load(None)?)?;
///
///     let summary = client.reindex(ReindexRequest::new(".")).await?;
///     println!("{:?}", summary.report.map(|r| r.counts()));
///
///     let answer = client.ask("Where is the ingestion job defined?", None).await?;
///     println!("{}", answer.answer);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RagClient {
    pub(crate) config: Arc<Config>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) store: Arc<dyn VectorStore>,
    pub(crate) chat: Arc<dyn ChatCompletion>,
    pub(crate) speech: Arc<dyn SpeechToText>,
    pub(crate) cache_path: PathBuf,
    // Serializes reindex runs so the revision cache is never written concurrently
    reindex_lock: Arc<Mutex<()>>,
}

impl RagClient {
    /// Build the hosted collaborators described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the OpenAI or Pinecone
    /// API key is missing.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        tracing::info!("Initializing RAG client");
        tracing::debug!("Embedding model: {}", config.openai.embedding_model);
        tracing::debug!("Chat model: {}", config.openai.chat_model);
        tracing::debug!("Vector index: {}", config.vector_db.index_name);

        let embedder = Arc::new(OpenAiEmbedder::from_config(&config.openai)?);
        let store = Arc::new(PineconeStore::new(&config.vector_db)?);
        let chat = Arc::new(OpenAiChat::from_config(&config.openai)?);
        let speech = Arc::new(WhisperClient::from_config(&config.openai)?);

        Ok(Self::with_components(config, embedder, store, chat, speech))
    }

    /// Assemble a client from explicit collaborators
    pub fn with_components(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatCompletion>,
        speech: Arc<dyn SpeechToText>,
    ) -> Self {
        let cache_path = config.cache.revision_cache_path.clone();
        tracing::debug!("Using revision cache file: {:?}", cache_path);
        Self {
            config: Arc::new(config),
            embedder,
            store,
            chat,
            speech,
            cache_path,
            reindex_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reconciler for `identity` reading changed paths through `reader`
    pub fn reconciler(&self, identity: RepoIdentity, reader: Arc<dyn FileReader>) -> Result<Reconciler> {
        let indexing = &self.config.indexing;
        let filter = PathFilter::new(&indexing.include_patterns, &indexing.exclude_patterns)?;

        let mut reconciler = Reconciler::new(
            identity,
            reader,
            self.embedder.clone(),
            self.store.clone(),
        )
        .with_filter(filter)
        .with_category(indexing.category.clone())
        .with_concurrency(indexing.concurrency);

        if indexing.granularity == Granularity::Chunk {
            reconciler = reconciler.with_chunker(self.chunker(indexing.chunk_size, indexing.overlap)?);
        }
        Ok(reconciler)
    }

    fn chunker(&self, chunk_size: usize, overlap: usize) -> Result<TokenChunker> {
        let tokenizer = TiktokenTokenizer::for_model(&self.config.openai.embedding_model)?;
        Ok(TokenChunker::new(Arc::new(tokenizer), chunk_size, overlap)?)
    }

    /// Diff, plan and reconcile a repository against the vector store
    ///
    /// Without `diff_text` the change set comes from git: `base` defaults to the
    /// cached revision of the repository (else `HEAD~1`) and `head` to `HEAD`, and
    /// file content is read as committed in `head`. The revision cache advances
    /// only after a clean run driven by git.
    pub async fn reindex(&self, request: ReindexRequest) -> Result<ReindexSummary> {
        let _guard = self.reindex_lock.lock().await;

        let mut cache = RevisionCache::load(&self.cache_path)?;
        let (source, mut summary) = prepare_reindex(&self.config, &request, &cache).await?;
        let repo_id = summary.repo_id.clone();

        if request.dry_run {
            log_dry_run(&summary);
            return Ok(summary);
        }

        let reconciler = self.reconciler(source.identity.clone(), source.reader.clone())?;
        let report = reconciler.execute(&summary.plan).await;

        let recordable = source.head.as_deref().filter(|_| source.from_git);
        if let Some(head) = recordable {
            if report.is_clean() {
                cache.record(repo_id.clone(), head);
                match cache.save(&self.cache_path) {
                    Ok(()) => summary.cache_updated = true,
                    Err(e) => tracing::warn!("Failed to save revision cache: {}", e),
                }
            } else {
                tracing::warn!("Not advancing the cached revision of {}: run had failures", repo_id);
            }
        }

        summary.report = Some(report);
        Ok(summary)
    }

    /// Answer `question` from the indexed content
    pub async fn ask(&self, question: &str, top_k: Option<usize>) -> Result<AskResponse> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        retrieval::answer_question(
            self.embedder.as_ref(),
            self.store.as_ref(),
            self.chat.as_ref(),
            question,
            top_k,
        )
        .await
    }

    /// Embed and store an arbitrary text, returning the id it was stored under
    ///
    /// Without an explicit `id` the SHA-256 of the text is used.
    pub async fn upsert_text(
        &self,
        text: &str,
        mut meta: BTreeMap<String, String>,
        id: Option<String>,
    ) -> Result<String> {
        if text.trim().is_empty() {
            return Err(ValidationError::Empty("text".to_string()).into());
        }
        let id = match id {
            Some(id) if id.trim().is_empty() => {
                return Err(ValidationError::Empty("id".to_string()).into());
            }
            Some(id) => id,
            None => content_id(text),
        };

        let vector = self.embedder.embed(text).await?;
        meta.insert(metadata::CONTENT.to_string(), text.to_string());
        self.store
            .upsert(vec![IndexRecord::new(id.clone(), vector, meta)])
            .await?;

        tracing::info!("Upserted text as {}", id);
        Ok(id)
    }

    /// Split `text` into token windows with the embedding model's tokenizer
    pub fn chunk_text(&self, text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TokenChunk>> {
        Ok(self.chunker(chunk_size, overlap)?.chunk(text)?)
    }

    /// Transcribe an audio or video file
    pub async fn transcribe(&self, path: &Path) -> Result<String> {
        transcribe_file(self.speech.as_ref(), path).await
    }

    /// Transcribe `path`, then store each token window of the transcript
    ///
    /// Every window is stored under the SHA-256 of its text with `content`,
    /// `video_id` (the file path) and the caller's metadata. Returns the ids in
    /// window order.
    pub async fn index_transcript(
        &self,
        path: &Path,
        chunk_size: usize,
        overlap: usize,
        meta: BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let chunker = self.chunker(chunk_size, overlap)?;
        let transcript = self.transcribe(path).await?;
        let chunks = chunker.chunk(&transcript)?;
        if chunks.is_empty() {
            tracing::warn!("Transcript of {} is empty, nothing to index", path.display());
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::other(format!(
                "embedding returned {} vectors for {} transcript chunks",
                vectors.len(),
                texts.len()
            )));
        }

        let video_id = path.display().to_string();
        let records: Vec<IndexRecord> = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| {
                let mut record_meta = meta.clone();
                record_meta.insert(metadata::VIDEO_ID.to_string(), video_id.clone());
                let id = content_id(&text);
                record_meta.insert(metadata::CONTENT.to_string(), text);
                IndexRecord::new(id, vector, record_meta)
            })
            .collect();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        self.store.upsert(records).await?;
        tracing::info!("Indexed {} transcript chunks of {}", ids.len(), video_id);
        Ok(ids)
    }

    /// Repository names of a code-hosting organization
    pub async fn list_org_repos(&self, org: &str) -> Result<Vec<String>> {
        GitHubClient::from_config(&self.config.github)?
            .list_org_repos(org)
            .await
    }
}

/// Diff and plan a reindex without building any hosted collaborator
///
/// This is what a dry run does; no credentials are needed.
pub async fn plan_reindex(config: &Config, request: &ReindexRequest) -> Result<ReindexSummary> {
    config.validate()?;
    let cache = RevisionCache::load(&config.cache.revision_cache_path)?;
    let (_, summary) = prepare_reindex(config, request, &cache).await?;
    log_dry_run(&summary);
    Ok(summary)
}

fn log_dry_run(summary: &ReindexSummary) {
    tracing::info!(
        "Dry run: {} upserts and {} deletions planned",
        summary.plan.upserts.len(),
        summary.plan.delete_paths.len()
    );
}

/// Resolve the diff of `request`, parse it and plan the reconciliation
async fn prepare_reindex(
    config: &Config,
    request: &ReindexRequest,
    cache: &RevisionCache,
) -> Result<(DiffSource, ReindexSummary)> {
    let source = diff_source(config, request, cache).await?;
    let repo_id = source.identity.repo_id();

    let (changes, errors) = parse_name_status(&source.diff_text);
    let diff_errors: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    tracing::info!(
        "Diff for {} ({} -> {}): {} changes, {} unusable lines",
        repo_id,
        source.base.as_deref().unwrap_or("?"),
        source.head.as_deref().unwrap_or("?"),
        changes.len(),
        diff_errors.len()
    );

    let indexing = &config.indexing;
    let filter = PathFilter::new(&indexing.include_patterns, &indexing.exclude_patterns)?;
    let plan = plan_changes(&source.identity, &filter, &changes);

    let summary = ReindexSummary {
        repo_id,
        base: source.base.clone(),
        head: source.head.clone(),
        diff_errors,
        plan,
        report: None,
        cache_updated: false,
    };
    Ok((source, summary))
}

async fn diff_source(config: &Config, request: &ReindexRequest, cache: &RevisionCache) -> Result<DiffSource> {
    let organization = config.indexing.organization.clone();
    let name_override = config.indexing.repo_name.clone();
    let max_file_size = config.indexing.max_file_size;
    let repo_dir = request.repo_dir.clone();

    if let Some(diff_text) = request.diff_text.clone() {
        let base = request.base.clone();
        let head = request.head.clone();
        // git is only consulted for the repository name and root
        return tokio::task::spawn_blocking(move || -> Result<DiffSource> {
            let (workdir, detected) = match GitRepository::discover(&repo_dir) {
                Ok(git) => (git.workdir().to_path_buf(), git.repo_name()),
                Err(_) => {
                    let name = repo_dir
                        .canonicalize()
                        .ok()
                        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()));
                    (repo_dir.clone(), name)
                }
            };
            let repo_name = name_override.or(detected).ok_or_else(|| {
                ConfigError::MissingRequired("indexing.repo_name".to_string())
            })?;
            Ok(DiffSource {
                identity: RepoIdentity::new(organization, repo_name),
                reader: Arc::new(LocalFileReader::new(workdir, max_file_size)),
                base,
                head,
                diff_text,
                from_git: false,
            })
        })
        .await
        .map_err(|e| RagError::other(format!("diff task panicked: {}", e)))?;
    }

    let cache = cache.clone();
    let base = request.base.clone();
    let head = request.head.clone();
    tokio::task::spawn_blocking(move || -> Result<DiffSource> {
        let git = GitRepository::discover(&repo_dir)?;
        let repo_name = name_override.or_else(|| git.repo_name()).ok_or_else(|| {
            ConfigError::MissingRequired("indexing.repo_name".to_string())
        })?;
        let identity = RepoIdentity::new(organization, repo_name);

        let base_rev = match base {
            Some(rev) => rev,
            None => match cache.revision(&identity.repo_id()) {
                Some(rev) => {
                    tracing::info!("Resuming {} from cached revision {}", identity.repo_id(), rev);
                    rev.to_string()
                }
                None => "HEAD~1".to_string(),
            },
        };
        let head_rev = head.unwrap_or_else(|| "HEAD".to_string());

        let base_commit = git.resolve_commit(&base_rev)?;
        let head_commit = git.resolve_commit(&head_rev)?;
        let diff_text = git.diff(&base_commit, &head_commit)?;
        let reader = GitTreeReader::open(git.workdir(), &head_commit, max_file_size)?;

        Ok(DiffSource {
            identity,
            reader: Arc::new(reader),
            base: Some(base_commit),
            head: Some(head_commit),
            diff_text,
            from_git: true,
        })
    })
    .await
    .map_err(|e| RagError::other(format!("diff task panicked: {}", e)))?
}

/// Chunk `text` with the tokenizer of `model`, without any hosted collaborator
pub fn chunk_text(model: &str, text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TokenChunk>> {
    let tokenizer = TiktokenTokenizer::for_model(model)?;
    let chunker = TokenChunker::new(Arc::new(tokenizer), chunk_size, overlap)?;
    Ok(chunker.chunk(text)?)
}

/// Read `path` and send it to `speech`
pub async fn transcribe_file(speech: &dyn SpeechToText, path: &Path) -> Result<String> {
    let audio = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ReadError::NotFound(path.display().to_string()),
        _ => ReadError::Io {
            file: path.display().to_string(),
            reason: e.to_string(),
        },
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());

    tracing::info!("Transcribing {} ({} bytes)", filename, audio.len());
    speech.transcribe(audio, &filename).await
}
