//! Revision diffs for incremental reindexing
//!
//! A diff is exchanged as `git diff --name-status` text so that any producer
//! (the git2 backend, a file, stdin) feeds the same parser.

/// Name-status parsing into a change set
pub mod diff;
/// git2-backed repository access
pub mod repository;
mod tree_reader;

pub use diff::parse_name_status;
pub use repository::{GitRepository, RevisionDiff};
pub use tree_reader::GitTreeReader;
