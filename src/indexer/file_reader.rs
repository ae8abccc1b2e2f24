use crate::error::ReadError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Source of file content for changed paths
#[async_trait]
pub trait FileReader: Send + Sync {
    /// Read the current content of a repository-relative path
    async fn read(&self, path: &str) -> Result<String, ReadError>;
}

/// Reads files from a local working tree
#[derive(Debug, Clone)]
pub struct LocalFileReader {
    root: PathBuf,
    max_file_size: u64,
}

impl LocalFileReader {
    pub fn new(root: impl AsRef<Path>, max_file_size: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ReadError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(ReadError::Io {
                file: path.to_string(),
                reason: "path escapes the repository root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileReader for LocalFileReader {
    async fn read(&self, path: &str) -> Result<String, ReadError> {
        let full_path = self.resolve(path)?;

        let metadata = match tokio::fs::metadata(&full_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReadError::NotFound(path.to_string()));
            }
            Err(e) => {
                return Err(ReadError::Io {
                    file: path.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if !metadata.is_file() {
            return Err(ReadError::Io {
                file: path.to_string(),
                reason: "not a regular file".to_string(),
            });
        }
        if metadata.len() > self.max_file_size {
            return Err(ReadError::TooLarge {
                file: path.to_string(),
                size: metadata.len(),
                max: self.max_file_size,
            });
        }

        let bytes = tokio::fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReadError::NotFound(path.to_string())
            } else {
                ReadError::Io {
                    file: path.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        // Invalid UTF-8 is replaced rather than rejected
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Lossy UTF-8 decode for {}", path);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        })
    }
}
