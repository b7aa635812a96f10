//! `fetchUpdates`: pull remote changes into the worktree and
//! discover which event files changed, for the aggregate manager's
//! `invalidate_by_files`.

use crate::availability::AvailabilityObserver;
use crate::cli;
use crate::error::GitError;
use crate::worktree::WorktreeSpec;
use sparkle_core::error::AvailabilityReason;

/// Outcome of a single `fetchUpdates` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// `true` if the local worktree's HEAD moved.
    pub changed: bool,
    /// Event-store-relative filenames touched between the old and new HEAD
    /// (additions, modifications, and deletions alike — deletions never
    /// happen in practice since events are append-only, but
    /// `git diff --name-only` reports them uniformly).
    pub changed_filenames: Vec<String>,
}

/// Fetch `origin`, fast-forward or merge the tracked branch, and report
/// which event files changed so the caller can invalidate their
/// aggregates.
pub fn fetch_updates(
    spec: &WorktreeSpec,
    observer: &AvailabilityObserver,
) -> Result<FetchResult, GitError> {
    let worktree_dir = spec.worktree_abs_path();

    let before = cli::rev_parse(&worktree_dir, "HEAD")?.ok_or_else(|| GitError::NotFound {
        message: "worktree HEAD could not be resolved".into(),
    })?;

    if let Err(err) = cli::run(&worktree_dir, &["fetch", "origin"]) {
        observer.notify(false, err.availability_reason(), Some(err.to_string()));
        return Err(err);
    }

    let remote_ref = format!("origin/{}", spec.branch);
    let merge = cli::run(&worktree_dir, &["merge", &remote_ref, "--no-edit"]);
    if let Err(merge_err) = merge {
        let message = format!("fetchUpdates: merge of {remote_ref} failed: {merge_err}");
        observer.notify(false, AvailabilityReason::MergeConflict, Some(message.clone()));
        return Err(GitError::MergeConflict { message });
    }

    observer.notify(true, AvailabilityReason::FetchSuccess, None);

    let after = cli::rev_parse(&worktree_dir, "HEAD")?.ok_or_else(|| GitError::NotFound {
        message: "worktree HEAD could not be resolved after merge".into(),
    })?;

    if before == after {
        return Ok(FetchResult {
            changed: false,
            changed_filenames: Vec::new(),
        });
    }

    let diff = cli::run(
        &worktree_dir,
        &[
            "diff",
            "--name-only",
            &before,
            &after,
            "--",
            &spec.directory,
        ],
    )?;

    let prefix = format!("{}/", spec.directory);
    let changed_filenames = diff
        .stdout
        .lines()
        .filter_map(|line| line.strip_prefix(&prefix))
        .map(ToString::to_string)
        .collect();

    Ok(FetchResult {
        changed: true,
        changed_filenames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("sparkle-fetch-test-{label}-{n}"))
    }

    fn init_bare_remote(path: &Path) {
        std::fs::create_dir_all(path).unwrap();
        cli::run(path, &["init", "-q", "--bare"]).unwrap();
    }

    fn clone_worktree(label: &str, remote: &Path) -> WorktreeSpec {
        let host = tmp(&format!("{label}-host"));
        std::fs::create_dir_all(&host).unwrap();
        cli::run(&host, &["clone", "-q", remote.to_str().unwrap(), "."]).unwrap();
        cli::run(&host, &["config", "user.email", "test@example.com"]).unwrap();
        cli::run(&host, &["config", "user.name", "Test"]).unwrap();
        WorktreeSpec {
            repo_root: host.clone(),
            branch: "main".into(),
            directory: "data".into(),
            worktree_path: ".".into(),
        }
    }

    fn seed_remote(label: &str) -> std::path::PathBuf {
        let remote = tmp(&format!("{label}-remote.git"));
        init_bare_remote(&remote);
        let seed = tmp(&format!("{label}-seed"));
        std::fs::create_dir_all(&seed).unwrap();
        cli::run(&seed, &["init", "-q", "-b", "main"]).unwrap();
        cli::run(&seed, &["config", "user.email", "test@example.com"]).unwrap();
        cli::run(&seed, &["config", "user.name", "Test"]).unwrap();
        std::fs::create_dir_all(seed.join("data")).unwrap();
        std::fs::write(seed.join("data").join("seed.json"), "{}").unwrap();
        cli::run(&seed, &["add", "-A"]).unwrap();
        cli::run(&seed, &["commit", "-q", "-m", "seed"]).unwrap();
        cli::run(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]).unwrap();
        cli::run(&seed, &["push", "-u", "origin", "main"]).unwrap();
        remote
    }

    #[test]
    fn no_remote_changes_reports_unchanged() {
        let remote = seed_remote("noop");
        let spec = clone_worktree("noop", &remote);
        let observer = AvailabilityObserver::new();
        let result = fetch_updates(&spec, &observer).unwrap();
        assert!(!result.changed);
        assert!(result.changed_filenames.is_empty());
    }

    #[test]
    fn detects_new_event_file_from_origin() {
        let remote = seed_remote("detect");
        let spec = clone_worktree("detect", &remote);

        let other = tmp("detect-other");
        std::fs::create_dir_all(&other).unwrap();
        cli::run(&other, &["clone", "-q", remote.to_str().unwrap(), "."]).unwrap();
        cli::run(&other, &["config", "user.email", "test@example.com"]).unwrap();
        cli::run(&other, &["config", "user.name", "Test"]).unwrap();
        std::fs::write(other.join("data").join("12345678.json"), "{}").unwrap();
        cli::run(&other, &["add", "-A"]).unwrap();
        cli::run(&other, &["commit", "-q", "-m", "add item"]).unwrap();
        cli::run(&other, &["push", "origin", "main"]).unwrap();

        let observer = AvailabilityObserver::new();
        let result = fetch_updates(&spec, &observer).unwrap();
        assert!(result.changed);
        assert_eq!(result.changed_filenames, vec!["12345678.json".to_string()]);
    }
}
