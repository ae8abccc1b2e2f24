use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Last revision a repository was reconciled at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    /// Full commit id
    pub revision: String,
    pub reconciled_at: DateTime<Utc>,
}

/// Persisted map of repository identifier -> last cleanly reconciled revision
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RevisionCache {
    pub repos: BTreeMap<String, RevisionEntry>,
}

impl RevisionCache {
    /// Get the default cache file path
    pub fn default_path() -> PathBuf {
        crate::paths::PlatformPaths::default_revision_cache_path()
    }

    /// Load cache from disk; a missing file is an empty cache
    pub fn load(cache_path: &Path) -> Result<Self, CacheError> {
        if !cache_path.exists() {
            tracing::debug!("Revision cache file not found, starting with empty cache");
            return Ok(Self::default());
        }

        let load_err = |reason: String| CacheError::LoadFailed {
            path: cache_path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(cache_path).map_err(|e| load_err(e.to_string()))?;
        let cache: RevisionCache =
            serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))?;

        tracing::info!(
            "Loaded revision cache with {} repositories",
            cache.repos.len()
        );
        Ok(cache)
    }

    /// Save cache to disk, creating parent directories
    pub fn save(&self, cache_path: &Path) -> Result<(), CacheError> {
        let save_err = |reason: String| CacheError::SaveFailed {
            path: cache_path.display().to_string(),
            reason,
        };

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| save_err(e.to_string()))?;
        fs::write(cache_path, content).map_err(|e| save_err(e.to_string()))?;

        tracing::debug!("Saved revision cache to {:?}", cache_path);
        Ok(())
    }

    pub fn get(&self, repo_id: &str) -> Option<&RevisionEntry> {
        self.repos.get(repo_id)
    }

    /// Cached revision for a repository
    pub fn revision(&self, repo_id: &str) -> Option<&str> {
        self.repos.get(repo_id).map(|e| e.revision.as_str())
    }

    /// Record a successful reconciliation at `revision`
    pub fn record(&mut self, repo_id: impl Into<String>, revision: impl Into<String>) {
        self.repos.insert(
            repo_id.into(),
            RevisionEntry {
                revision: revision.into(),
                reconciled_at: Utc::now(),
            },
        );
    }

    pub fn remove(&mut self, repo_id: &str) -> bool {
        self.repos.remove(repo_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_empty() {
        let cache = RevisionCache::default();
        assert!(cache.repos.is_empty());
        assert_eq!(cache.revision("acme/repo"), None);
    }

    #[test]
    fn test_record_overwrites() {
        let mut cache = RevisionCache::default();
        cache.record("acme/repo", "aaa");
        cache.record("acme/repo", "bbb");

        assert_eq!(cache.repos.len(), 1);
        assert_eq!(cache.revision("acme/repo"), Some("bbb"));
    }

    #[test]
    fn test_remove() {
        let mut cache = RevisionCache::default();
        cache.record("acme/repo", "aaa");
        assert!(cache.remove("acme/repo"));
        assert!(!cache.remove("acme/repo"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("revisions.json");

        let mut cache = RevisionCache::default();
        cache.record("DataExpert-io/handbook", "0123456789abcdef");
        cache.save(&path).unwrap();

        let loaded = RevisionCache::load(&path).unwrap();
        assert_eq!(loaded.revision("DataExpert-io/handbook"), Some("0123456789abcdef"));
        assert_eq!(
            loaded.get("DataExpert-io/handbook"),
            cache.get("DataExpert-io/handbook")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let cache = RevisionCache::load(&dir.path().join("absent.json")).unwrap();
        assert!(cache.repos.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("revisions.json");
        fs::write(&path, "{ not json").unwrap();

        let result = RevisionCache::load(&path);
        assert!(matches!(result, Err(CacheError::LoadFailed { .. })));
    }
}
