//! `commitAndPush`: stage, commit, and push with
//! rebase-on-failure retry.

use crate::availability::AvailabilityObserver;
use crate::cli;
use crate::error::GitError;
use crate::worktree::WorktreeSpec;
use sparkle_core::error::AvailabilityReason;
use std::time::Duration;

/// Number of push attempts before giving up.
pub const DEFAULT_RETRIES: u32 = 5;

/// Result of [`commit_and_push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub changed: bool,
}

fn commit_message(filenames: &[String]) -> String {
    match filenames.len() {
        0 => "sparkle: sync".to_string(),
        1 => format!("sparkle: {}", filenames[0]),
        n => format!("sparkle: {n} event files"),
    }
}

/// Stage everything, commit if there is something staged, then push with
/// exponential-backoff retry.
///
/// `filenames` is used only to synthesise a readable commit message; it is
/// not otherwise validated against what `git add -A` actually staged.
pub fn commit_and_push(
    spec: &WorktreeSpec,
    filenames: &[String],
    retries: u32,
    observer: &AvailabilityObserver,
) -> Result<CommitResult, GitError> {
    let worktree_dir = spec.worktree_abs_path();

    cli::run(&worktree_dir, &["add", "-A"])?;
    let status = cli::run(&worktree_dir, &["status", "--porcelain"])?;
    if status.stdout.trim().is_empty() {
        return Ok(CommitResult { changed: false });
    }

    cli::run(
        &worktree_dir,
        &["commit", "-q", "-m", &commit_message(filenames)],
    )?;

    let mut last_error: Option<GitError> = None;
    for attempt in 0..retries {
        match cli::run(&worktree_dir, &["push", "origin", &spec.branch]) {
            Ok(_) => {
                observer.notify(true, AvailabilityReason::PushSuccess, None);
                return Ok(CommitResult { changed: true });
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "push failed, attempting rebase-retry");
                cli::run(&worktree_dir, &["fetch", "origin"])?;
                let merge = cli::run(
                    &worktree_dir,
                    &["merge", &format!("origin/{}", spec.branch), "--no-edit"],
                );
                if let Err(merge_err) = merge {
                    let message = format!("cannot reconcile local commit with origin: {merge_err}");
                    observer.notify(
                        false,
                        AvailabilityReason::MergeConflict,
                        Some(message.clone()),
                    );
                    return Err(GitError::MergeConflict { message });
                }
                last_error = Some(err);
                if attempt + 1 < retries {
                    std::thread::sleep(Duration::from_secs(2u64.saturating_pow(attempt)));
                }
            }
        }
    }

    let err = last_error.unwrap_or_else(|| GitError::BackendError {
        args: "push".into(),
        message: "exhausted retries with no recorded error".into(),
    });
    observer.notify(false, AvailabilityReason::PushFailed, Some(err.to_string()));
    Err(GitError::PushFailed {
        remote: "origin".into(),
        attempts: retries,
        message: err.to_string(),
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
        std::env::temp_dir().join(format!("sparkle-commit-test-{label}-{n}"))
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
        std::fs::write(seed.join("README.md"), "hi").unwrap();
        cli::run(&seed, &["add", "-A"]).unwrap();
        cli::run(&seed, &["commit", "-q", "-m", "seed"]).unwrap();
        cli::run(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]).unwrap();
        cli::run(&seed, &["push", "-u", "origin", "main"]).unwrap();
        remote
    }

    #[test]
    fn no_changes_returns_unchanged() {
        let remote = seed_remote("nochange");
        let spec = clone_worktree("nochange", &remote);
        let observer = AvailabilityObserver::new();
        let result = commit_and_push(&spec, &[], DEFAULT_RETRIES, &observer).unwrap();
        assert!(!result.changed);
    }

    #[test]
    fn commits_and_pushes_new_file() {
        let remote = seed_remote("push");
        let spec = clone_worktree("push", &remote);
        std::fs::write(spec.worktree_abs_path().join("data.json"), "{}").unwrap();
        let observer = AvailabilityObserver::new();
        let result = commit_and_push(
            &spec,
            &["data.json".to_string()],
            DEFAULT_RETRIES,
            &observer,
        )
        .unwrap();
        assert!(result.changed);

        let log = cli::run(&spec.worktree_abs_path(), &["log", "--oneline", "-1"]).unwrap();
        assert!(log.stdout.contains("data.json"));
    }
}
