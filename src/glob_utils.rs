//! Glob pattern filtering of changed paths

use crate::error::{ConfigError, RagError};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Include/exclude filter over repository-relative paths
///
/// An empty include list admits every path. Excludes win over includes.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

fn build_set(key: &str, patterns: &[String]) -> Result<GlobSet, RagError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("invalid glob '{}': {}", pattern, e),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, RagError> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_set("indexing.include_patterns", include)?)
        };
        Ok(Self {
            include,
            exclude: build_set("indexing.exclude_patterns", exclude)?,
        })
    }

    /// Filter that admits everything
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: GlobSet::empty(),
        }
    }

    /// Why `path` is filtered out, or `None` when it is admitted
    pub fn rejection(&self, path: &str) -> Option<&'static str> {
        let path = path.trim_start_matches('/');
        if self.exclude.is_match(path) {
            return Some("matches an exclude pattern");
        }
        match &self.include {
            Some(include) if !include.is_match(path) => Some("matches no include pattern"),
            _ => None,
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        self.rejection(path).is_none()
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}
