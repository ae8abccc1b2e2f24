use crate::error::{DiffError, ReadError};
use crate::indexer::FileReader;
use async_trait::async_trait;
use git2::{ErrorCode, ObjectType, Oid, Repository};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Reads file content as committed in one revision
///
/// Changed paths of a git diff are resolved in the tree of the diff's target
/// commit, so uncommitted edits and local deletions in the working tree never
/// leak into the index.
#[derive(Clone)]
pub struct GitTreeReader {
    repo: Arc<Mutex<Repository>>,
    tree: Oid,
    max_file_size: u64,
}

impl GitTreeReader {
    /// Open the repository containing `path` and pin reads to `rev`
    pub fn open(path: &Path, rev: &str, max_file_size: u64) -> Result<Self, DiffError> {
        let repo = Repository::discover(path)
            .map_err(|_| DiffError::RepoNotFound(path.display().to_string()))?;
        let tree = repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_tree())
            .map_err(|e| DiffError::RevisionNotFound(format!("{}: {}", rev, e.message())))?
            .id();

        tracing::debug!("Reading changed files from tree {} ({})", tree, rev);

        Ok(Self {
            repo: Arc::new(Mutex::new(repo)),
            tree,
            max_file_size,
        })
    }

    fn read_blob(repo: &Repository, tree: Oid, path: &str, max: u64) -> Result<String, ReadError> {
        let io = |reason: String| ReadError::Io {
            file: path.to_string(),
            reason,
        };

        let tree = repo.find_tree(tree).map_err(|e| io(e.message().to_string()))?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(ReadError::NotFound(path.to_string()));
            }
            Err(e) => return Err(io(e.message().to_string())),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Err(io("not a regular file".to_string()));
        }

        let blob = repo
            .find_blob(entry.id())
            .map_err(|e| io(e.message().to_string()))?;
        let size = blob.size() as u64;
        if size > max {
            return Err(ReadError::TooLarge {
                file: path.to_string(),
                size,
                max,
            });
        }

        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }
}

#[async_trait]
impl FileReader for GitTreeReader {
    async fn read(&self, path: &str) -> Result<String, ReadError> {
        let repo = self.repo.clone();
        let tree = self.tree;
        let max = self.max_file_size;
        let owned = path.to_string();

        tokio::task::spawn_blocking(move || {
            let repo = repo.lock().map_err(|_| ReadError::Io {
                file: owned.clone(),
                reason: "repository handle poisoned".to_string(),
            })?;
            Self::read_blob(&repo, tree, &owned, max)
        })
        .await
        .map_err(|e| ReadError::Io {
            file: path.to_string(),
            reason: format!("read task panicked: {}", e),
        })?
    }
}

impl std::fmt::Debug for GitTreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitTreeReader")
            .field("tree", &self.tree)
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};
    use std::fs;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) -> String {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_reads_committed_content_not_working_tree() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("jobs")).unwrap();
        fs::write(dir.path().join("jobs/load.py"), "committed = True\n").unwrap();
        let head = commit_all(&repo, "first");

        fs::write(dir.path().join("jobs/load.py"), "dirty = True\n").unwrap();

        let reader = GitTreeReader::open(dir.path(), &head, 1024).unwrap();
        assert_eq!(reader.read("jobs/load.py").await.unwrap(), "committed = True\n");

        fs::remove_file(dir.path().join("jobs/load.py")).unwrap();
        assert_eq!(reader.read("jobs/load.py").await.unwrap(), "committed = True\n");
    }

    #[tokio::test]
    async fn test_path_absent_from_revision() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        commit_all(&repo, "first");

        let reader = GitTreeReader::open(dir.path(), "HEAD", 1024).unwrap();
        assert!(matches!(
            reader.read("b.py").await,
            Err(ReadError::NotFound(p)) if p == "b.py"
        ));
    }

    #[tokio::test]
    async fn test_directory_and_size_cap() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/big.txt"), "x".repeat(100)).unwrap();
        commit_all(&repo, "first");

        let reader = GitTreeReader::open(dir.path(), "HEAD", 10).unwrap();
        assert!(matches!(reader.read("pkg").await, Err(ReadError::Io { .. })));
        assert!(matches!(
            reader.read("pkg/big.txt").await,
            Err(ReadError::TooLarge { size: 100, max: 10, .. })
        ));
    }

    #[test]
    fn test_unknown_revision() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        commit_all(&repo, "first");

        let result = GitTreeReader::open(dir.path(), "no-such-branch", 1024);
        assert!(matches!(
            result,
            Err(DiffError::RevisionNotFound(_))
        ));
    }
}
