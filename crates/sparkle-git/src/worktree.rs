//! Worktree bootstrap.
//!
//! Sets up a sparse-checkout (cone mode) of the sparkle branch, limited to
//! the single event-store data directory, in a separate worktree so the
//! developer's normal working set is untouched.

use crate::cli;
use crate::error::GitError;
use std::path::{Path, PathBuf};

/// Where a sparkle worktree lives relative to the host repository, and
/// which branch/directory it tracks.
#[derive(Debug, Clone)]
pub struct WorktreeSpec {
    /// Root of the host repository (the developer's normal checkout).
    pub repo_root: PathBuf,
    /// Branch dedicated to carrying the event store.
    pub branch: String,
    /// Directory inside that branch holding the event files.
    pub directory: String,
    /// Path (relative to `repo_root`) where the worktree is checked out.
    pub worktree_path: String,
}

impl WorktreeSpec {
    #[must_use]
    pub fn worktree_abs_path(&self) -> PathBuf {
        self.repo_root.join(&self.worktree_path)
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.worktree_abs_path().join(&self.directory)
    }
}

/// Ensure the worktree described by `spec` exists, bootstrapping it if
/// necessary. Returns the path to the data directory inside it.
///
/// If the worktree directory already exists this is a no-op (idempotent —
/// daemon restarts must not re-clone).
pub fn ensure_worktree(spec: &WorktreeSpec) -> Result<PathBuf, GitError> {
    if spec.worktree_abs_path().exists() {
        return Ok(spec.data_dir());
    }

    let remote_branch_ref = format!("refs/remotes/origin/{}", spec.branch);
    cli::run(&spec.repo_root, &["fetch", "origin"])?;
    let remote_exists = cli::ref_exists(&spec.repo_root, &remote_branch_ref)?;

    if remote_exists {
        cli::run(
            &spec.repo_root,
            &[
                "worktree",
                "add",
                "--track",
                "-B",
                &spec.branch,
                &spec.worktree_path,
                &format!("origin/{}", spec.branch),
            ],
        )?;
    } else {
        // Branch does not exist upstream yet: create it from origin's HEAD
        // and push it with upstream tracking before adding the worktree.
        let head = cli::rev_parse(&spec.repo_root, "origin/HEAD")?
            .or(cli::rev_parse(&spec.repo_root, "HEAD")?)
            .ok_or_else(|| GitError::NotFound {
                message: "neither origin/HEAD nor HEAD could be resolved".into(),
            })?;
        cli::run(
            &spec.repo_root,
            &["branch", &spec.branch, &head],
        )?;
        cli::run(
            &spec.repo_root,
            &[
                "push",
                "--set-upstream",
                "origin",
                &format!("{}:{}", spec.branch, spec.branch),
            ],
        )?;
        cli::run(
            &spec.repo_root,
            &[
                "worktree",
                "add",
                &spec.worktree_path,
                &spec.branch,
            ],
        )?;
    }

    let worktree_dir = spec.worktree_abs_path();
    enable_sparse_checkout(&worktree_dir, &spec.directory)?;
    ensure_host_gitignore(&spec.repo_root, &spec.worktree_path)?;
    ensure_data_dir_gitignore(&worktree_dir.join(&spec.directory))?;

    Ok(spec.data_dir())
}

/// Cone-mode sparse-checkout limited to one directory.
fn enable_sparse_checkout(worktree_dir: &Path, directory: &str) -> Result<(), GitError> {
    cli::run(worktree_dir, &["sparse-checkout", "init", "--cone"])?;
    cli::run(worktree_dir, &["sparse-checkout", "set", directory])?;
    Ok(())
}

/// Add the worktree path to the host repo's `.gitignore`.
fn ensure_host_gitignore(repo_root: &Path, worktree_path: &str) -> Result<(), GitError> {
    let entry = format!("{worktree_path}/");
    append_if_missing(&repo_root.join(".gitignore"), &entry)
}

/// Add `.aggregates/`, `last_port.data`, `*.log` to the data directory's
/// own `.gitignore` so derived/local state never gets
/// staged by a plain `git add -A`.
fn ensure_data_dir_gitignore(data_dir: &Path) -> Result<(), GitError> {
    std::fs::create_dir_all(data_dir).map_err(|source| GitError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;
    let path = data_dir.join(".gitignore");
    for entry in [".aggregates/", "last_port.data", "*.log"] {
        append_if_missing(&path, entry)?;
    }
    Ok(())
}

fn append_if_missing(path: &Path, entry: &str) -> Result<(), GitError> {
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    if existing.lines().any(|l| l.trim() == entry) {
        return Ok(());
    }
    let mut contents = existing;
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(entry);
    contents.push('\n');
    std::fs::write(path, contents).map_err(|source| GitError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("sparkle-worktree-test-{label}-{n}"))
    }

    fn init_bare_remote(path: &Path) {
        std::fs::create_dir_all(path).unwrap();
        cli::run(path, &["init", "-q", "--bare"]).unwrap();
    }

    fn init_host_repo(path: &Path, remote: &Path) {
        std::fs::create_dir_all(path).unwrap();
        cli::run(path, &["init", "-q", "-b", "main"]).unwrap();
        cli::run(path, &["config", "user.email", "test@example.com"]).unwrap();
        cli::run(path, &["config", "user.name", "Test"]).unwrap();
        std::fs::write(path.join("README.md"), "hi").unwrap();
        cli::run(path, &["add", "-A"]).unwrap();
        cli::run(path, &["commit", "-q", "-m", "initial"]).unwrap();
        cli::run(path, &["remote", "add", "origin", remote.to_str().unwrap()]).unwrap();
        cli::run(path, &["push", "-u", "origin", "main"]).unwrap();
    }

    #[test]
    fn bootstraps_new_branch_when_absent_upstream() {
        let base = tmp("new-branch");
        let remote = base.join("remote.git");
        let host = base.join("host");
        init_bare_remote(&remote);
        init_host_repo(&host, &remote);

        let spec = WorktreeSpec {
            repo_root: host.clone(),
            branch: "sparkle-data".into(),
            directory: ".sparkle".into(),
            worktree_path: ".sparkle-worktree".into(),
        };
        let data_dir = ensure_worktree(&spec).unwrap();
        assert!(data_dir.ends_with(".sparkle"));
        assert!(spec.worktree_abs_path().join(".git").exists() || spec.worktree_abs_path().exists());

        let gitignore = std::fs::read_to_string(host.join(".gitignore")).unwrap();
        assert!(gitignore.contains(".sparkle-worktree/"));
    }

    #[test]
    fn ensure_worktree_is_idempotent() {
        let base = tmp("idempotent");
        let remote = base.join("remote.git");
        let host = base.join("host");
        init_bare_remote(&remote);
        init_host_repo(&host, &remote);

        let spec = WorktreeSpec {
            repo_root: host.clone(),
            branch: "sparkle-data".into(),
            directory: ".sparkle".into(),
            worktree_path: ".sparkle-worktree".into(),
        };
        ensure_worktree(&spec).unwrap();
        let second = ensure_worktree(&spec).unwrap();
        assert!(second.ends_with(".sparkle"));
    }
}
