/// Configuration system for rag-sync
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, RagError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding, chat and speech API configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Hosted vector index configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,

    /// Reconciliation configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Question answering configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Code hosting API configuration
    #[serde(default)]
    pub github: GitHubConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// An API credential. Never printed and never written back to disk.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// OpenAI-compatible API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key; usually supplied through `OPENAI_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<Secret>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Embedding model; also selects the tokenizer vocabulary
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_transcription_language")]
    pub transcription_language: String,

    /// Sampling temperature for answers
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens for answers
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Hosted vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// API key; usually supplied through `PINECONE_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<Secret>,

    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Data-plane host of the index; resolved through the control plane when absent
    #[serde(default)]
    pub index_host: Option<String>,

    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// How a changed file is turned into index records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One record per file, keyed by the qualified file path
    #[default]
    File,
    /// One record per token window, keyed by `<qualified path>#<n>`
    Chunk,
}

impl FromStr for Granularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Granularity::File),
            "chunk" | "chunks" => Ok(Granularity::Chunk),
            other => Err(ConfigError::InvalidValue {
                key: "indexing.granularity".to_string(),
                reason: format!("must be 'file' or 'chunk', got '{}'", other),
            }),
        }
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Organization prefix of every record id
    #[serde(default = "default_organization")]
    pub organization: String,

    /// Repository name override; derived from the `origin` remote when absent
    #[serde(default)]
    pub repo_name: Option<String>,

    /// Value of the `category` metadata field
    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub granularity: Granularity,

    /// Token window length
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Tokens shared by consecutive windows
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Files embedded and upserted concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub include_patterns: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

/// Question answering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nearest neighbours fetched as context
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Code hosting API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token; usually supplied through `GITHUB_PAT`
    #[serde(default, skip_serializing)]
    pub token: Option<Secret>,

    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Last reconciled revision per repository
    #[serde(default = "default_revision_cache_path")]
    pub revision_cache_path: PathBuf,
}

// Default value functions
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_chat_model() -> String {
    "gpt-4".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_transcription_language() -> String {
    "en".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout() -> u64 {
    30
}

fn default_index_name() -> String {
    "rag-example-index".to_string()
}

fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_organization() -> String {
    "DataExpert-io".to_string()
}

fn default_category() -> String {
    "Github".to_string()
}

fn default_chunk_size() -> usize {
    200
}

fn default_overlap() -> usize {
    50
}

fn default_max_file_size() -> u64 {
    1_048_576 // 1 MB
}

fn default_concurrency() -> usize {
    4
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
    ]
}

fn default_top_k() -> usize {
    20
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_revision_cache_path() -> PathBuf {
    crate::paths::PlatformPaths::default_revision_cache_path()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            transcription_language: default_transcription_language(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_name: default_index_name(),
            index_host: None,
            control_plane_url: default_control_plane_url(),
            namespace: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            repo_name: None,
            category: default_category(),
            granularity: Granularity::default(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            max_file_size: default_max_file_size(),
            concurrency: default_concurrency(),
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_github_api_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            revision_cache_path: default_revision_cache_path(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, RagError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file. Credentials are not written.
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Render the effective configuration without credentials
    pub fn to_toml(&self) -> Result<String, RagError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)).into())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RagError> {
        if self.indexing.chunk_size == 0 {
            return Err(invalid("indexing.chunk_size", "must be greater than 0"));
        }

        if self.indexing.overlap >= self.indexing.chunk_size {
            tracing::warn!(
                "indexing.overlap ({}) >= indexing.chunk_size ({}); each file yields a single window",
                self.indexing.overlap,
                self.indexing.chunk_size
            );
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        if self.indexing.concurrency == 0 {
            return Err(invalid("indexing.concurrency", "must be greater than 0"));
        }

        if self.indexing.organization.trim().is_empty() {
            return Err(invalid("indexing.organization", "must not be empty"));
        }

        if self.vector_db.index_name.trim().is_empty() {
            return Err(invalid("vector_db.index_name", "must not be empty"));
        }

        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(invalid(
                "openai.temperature",
                &format!("must be between 0.0 and 2.0, got {}", self.openai.temperature),
            ));
        }

        if self.openai.timeout_secs == 0 || self.vector_db.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be greater than 0"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("OPENAI_API_KEY") {
            self.openai.api_key = Some(Secret::new(key));
        }

        if let Some(key) = var("PINECONE_API_KEY") {
            self.vector_db.api_key = Some(Secret::new(key));
        }

        if let Some(token) = var("GITHUB_PAT") {
            self.github.token = Some(Secret::new(token));
        }

        if let Some(name) = var("RAG_SYNC_INDEX_NAME") {
            self.vector_db.index_name = name;
        }

        if let Some(host) = var("RAG_SYNC_INDEX_HOST") {
            self.vector_db.index_host = Some(host);
        }

        if let Some(org) = var("RAG_SYNC_ORGANIZATION") {
            self.indexing.organization = org;
        }

        if let Some(model) = var("RAG_SYNC_EMBEDDING_MODEL") {
            self.openai.embedding_model = model;
        }

        if let Some(model) = var("RAG_SYNC_CHAT_MODEL") {
            self.openai.chat_model = model;
        }

        if let Some(size) = var("RAG_SYNC_CHUNK_SIZE")
            && let Ok(size) = size.parse()
        {
            self.indexing.chunk_size = size;
        }

        if let Some(overlap) = var("RAG_SYNC_OVERLAP")
            && let Ok(overlap) = overlap.parse()
        {
            self.indexing.overlap = overlap;
        }

        if let Some(granularity) = var("RAG_SYNC_GRANULARITY") {
            match granularity.parse() {
                Ok(g) => self.indexing.granularity = g,
                Err(e) => tracing::warn!("Ignoring RAG_SYNC_GRANULARITY: {}", e),
            }
        }

        if let Some(top_k) = var("RAG_SYNC_TOP_K")
            && let Ok(top_k) = top_k.parse()
        {
            self.retrieval.top_k = top_k;
        }
    }

    /// Load from `path` (or the default location), apply env overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, RagError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: &str) -> RagError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
