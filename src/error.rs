/// Centralized error types for rag-sync using thiserror
///
/// Every fallible library operation returns [`RagError`]; only the binary decides
/// whether an error terminates the process.
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// Main error type for the sync pipeline
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures talking to a hosted service (embeddings, chat, speech, vector store, code hosting)
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{service} request failed: {reason}")]
    Request { service: String, reason: String },

    #[error("{service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} call timed out after {secs} seconds")]
    Timeout { service: String, secs: u64 },

    #[error("{service} returned an unexpected response: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("Missing credentials for {0}")]
    MissingCredentials(String),
}

/// Errors reading local file content
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File '{file}' exceeds maximum size: {size} > {max}")]
    TooLarge { file: String, size: u64, max: u64 },

    #[error("Failed to read file '{file}': {reason}")]
    Io { file: String, reason: String },
}

/// Errors producing or parsing a revision diff
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Malformed diff line {line_no} '{line}': {reason}")]
    MalformedLine {
        line_no: usize,
        line: String,
        reason: String,
    },

    #[error("Git repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Git error: {0}")]
    Git(String),
}

/// Errors related to token chunking
#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("Tokenizer failure: {0}")]
    Tokenizer(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Empty {0}")]
    Empty(String),
}

/// Errors related to the revision cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to load cache from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save cache to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

impl ServiceError {
    /// Classify a reqwest transport error for the given service
    pub fn from_reqwest(service: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout {
                service: service.to_string(),
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            ServiceError::InvalidResponse {
                service: service.to_string(),
                reason: err.to_string(),
            }
        } else {
            ServiceError::Request {
                service: service.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

// Conversion from anyhow::Error to RagError
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Other(format!("{:#}", err))
    }
}

impl From<git2::Error> for DiffError {
    fn from(err: git2::Error) -> Self {
        DiffError::Git(err.message().to_string())
    }
}

impl From<git2::Error> for RagError {
    fn from(err: git2::Error) -> Self {
        RagError::Diff(err.into())
    }
}

// Helper methods for RagError
impl RagError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        RagError::Other(msg.into())
    }

    /// True for failures of a hosted service call (the transient kind)
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Service(_))
    }

    /// True when a local file was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, RagError::Read(ReadError::NotFound(_)))
    }

    /// Check if this is a user error (validation, bad config value) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RagError::Validation(_) | RagError::Config(ConfigError::InvalidValue { .. })
        )
    }
}
