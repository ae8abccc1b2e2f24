//! # rag-sync - Incremental Git-to-Vector-Index Synchronisation
//!
//! Keeps a hosted vector index in step with a git repository and answers
//! questions over the indexed content.
//!
//! ## Overview
//!
//! A reindex run takes the changes between two revisions (from git or from a
//! `--name-status` listing), splits renames into a delete plus an insert, embeds
//! and upserts every added or modified file exactly once, and removes vanished
//! records in one batched delete. Files can be stored whole or as overlapping
//! token windows. The last cleanly reconciled revision is cached per repository
//! so the next run picks up where this one stopped.
//!
//! ## Architecture
//!
//! ```text
//!   git2 diff / name-status text
//!              |
//!        parse_name_status ---> ChangeSet
//!              |
//!         Reconciler ------+------------------+
//!          |    |          |                  |
//!   FileReader  TokenChunker  EmbeddingProvider  VectorStore
//!   (local fs)  (tiktoken)    (OpenAI)           (Pinecone / memory)
//!
//!   ask: EmbeddingProvider -> VectorStore::query -> ChatCompletion
//! ```
//!
//! ## Modules
//!
//! - [`client`]: [`RagClient`] facade, reconciliation and retrieval
//! - [`indexer`]: tokenizer, token-window chunker and file reader
//! - [`git`]: name-status parsing and git2-backed revision diffs
//! - [`embedding`]: embedding provider trait and OpenAI implementation
//! - [`vector_db`]: vector store trait, Pinecone REST client and in-memory store
//! - [`llm`]: chat completion and speech-to-text collaborators
//! - [`github`]: organization repository listing
//! - [`revision_cache`]: last reconciled revision per repository
//! - [`config`]: TOML configuration with environment overrides
//! - [`error`]: error types and result alias
//!
//! ## Usage Example
//!
//! ```no_run
//! use rag_sync::{Config, RagClient, ReindexRequest};
//!
//! #[tokio::main]
//! async fn main() -> rag_sync::Result<()> {
//!     let client = RagClient::from_config(Config::load(None)?)?;
//!     let summary = client.reindex(ReindexRequest::new("/path/to/repo")).await?;
//!     println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
//!     Ok(())
//! }
//! ```

/// High-level client: reindexing, retrieval and ad hoc operations
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding generation through the OpenAI API
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Name-status diff parsing and git2 revision diffs
pub mod git;

/// Organization repository listing
pub mod github;

/// Include/exclude path filtering
pub mod glob_utils;

mod http;

/// Tokenizing chunker and local file access
pub mod indexer;

/// Chat completion and transcription collaborators
pub mod llm;

/// Platform-specific default locations
pub mod paths;

/// Persistent record of reconciled revisions
pub mod revision_cache;

/// Shared data model
pub mod types;

/// Vector store abstraction with Pinecone and in-memory backends
pub mod vector_db;

pub use client::{RagClient, Reconciler};
pub use config::Config;
pub use error::{RagError, Result};
pub use types::{
    AskResponse, ChangeSet, IndexRecord, QueryMatch, ReconcilePlan, ReconcileReport,
    ReindexRequest, ReindexSummary, RepoIdentity, TokenChunk,
};
