use crate::error::DiffError;
use git2::{Delta, DiffFindOptions, DiffOptions, ErrorCode, Repository, Tree};
use std::path::{Path, PathBuf};

/// Producer of `--name-status` diff text between two revisions
pub trait RevisionDiff {
    fn diff(&self, from_rev: &str, to_rev: &str) -> Result<String, DiffError>;
}

/// A local git working tree
pub struct GitRepository {
    repo: Repository,
    workdir: PathBuf,
}

impl GitRepository {
    /// Discover and open a git repository from any path within it
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, DiffError> {
        let path = path.as_ref();

        // Walks up the directory tree
        let repo = Repository::discover(path)
            .map_err(|_| DiffError::RepoNotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| DiffError::Git("bare repositories have no working tree".to_string()))?
            .to_path_buf();

        tracing::info!("Opened git repository at: {}", workdir.display());

        Ok(Self { repo, workdir })
    }

    /// Root of the working tree; changed paths are relative to it
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// URL of the `origin` remote, if configured
    pub fn origin_url(&self) -> Option<String> {
        let remote = self.repo.find_remote("origin").ok()?;
        remote.url().map(str::to_string)
    }

    /// Repository name from the origin URL, falling back to the working tree's directory name
    pub fn repo_name(&self) -> Option<String> {
        self.origin_url()
            .as_deref()
            .and_then(repo_name_from_url)
            .or_else(|| {
                self.workdir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
            })
    }

    /// Full commit id that `rev` points to
    pub fn resolve_commit(&self, rev: &str) -> Result<String, DiffError> {
        let commit = self
            .repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| revision_error(rev, e))?;
        Ok(commit.id().to_string())
    }

    /// Commit id of HEAD
    pub fn head_commit(&self) -> Result<String, DiffError> {
        self.resolve_commit("HEAD")
    }

    fn tree_for(&self, rev: &str) -> Result<Tree<'_>, DiffError> {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_tree())
            .map_err(|e| revision_error(rev, e))
    }
}

fn revision_error(rev: &str, err: git2::Error) -> DiffError {
    match err.code() {
        ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
            DiffError::RevisionNotFound(format!("{}: {}", rev, err.message()))
        }
        _ => err.into(),
    }
}

impl RevisionDiff for GitRepository {
    fn diff(&self, from_rev: &str, to_rev: &str) -> Result<String, DiffError> {
        let old_tree = self.tree_for(from_rev)?;
        let new_tree = self.tree_for(to_rev)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.include_typechange(true);
        let mut diff =
            self.repo
                .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut diff_opts))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))?;

        let mut out = String::new();
        let mut entries = 0usize;
        for delta in diff.deltas() {
            let old_path = delta.old_file().path().map(|p| p.to_string_lossy().to_string());
            let new_path = delta.new_file().path().map(|p| p.to_string_lossy().to_string());

            let line = match (delta.status(), old_path, new_path) {
                (Delta::Added, _, Some(new)) => format!("A\t{}", new),
                (Delta::Modified, _, Some(new)) => format!("M\t{}", new),
                (Delta::Deleted, Some(old), _) => format!("D\t{}", old),
                (Delta::Renamed, Some(old), Some(new)) => {
                    // Similarity is only known for exact renames
                    let status = if delta.old_file().id() == delta.new_file().id() {
                        "R100"
                    } else {
                        "R"
                    };
                    format!("{}\t{}\t{}", status, old, new)
                }
                (Delta::Copied, Some(old), Some(new)) => format!("C\t{}\t{}", old, new),
                (Delta::Typechange, _, Some(new)) => format!("T\t{}", new),
                (Delta::Conflicted, _, Some(new)) => format!("U\t{}", new),
                (status, old, new) => {
                    tracing::debug!("Ignoring delta {:?} ({:?} -> {:?})", status, old, new);
                    continue;
                }
            };
            out.push_str(&line);
            out.push('\n');
            entries += 1;
        }

        tracing::debug!("Diff {}..{} produced {} entries", from_rev, to_rev, entries);

        Ok(out)
    }
}

/// Last path segment of a remote URL without `.git`
///
/// Handles `https://host/org/repo.git`, `git@host:org/repo.git` and trailing slashes.
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let name = trimmed.rsplit(['/', ':']).next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
