//! Thin subprocess wrapper around the `git` binary.
//!
//! No `git2`/`gix` dependency: every operation shells out to the `git`
//! binary directly, since the operations this crate needs —
//! sparse-checkout cone mode, worktree management, rebase-retry push —
//! are exactly the ones a plain CLI invocation handles most directly.

use crate::error::GitError;
use std::path::Path;
use std::process::Command;

/// Output of a successful `git` invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `git <args>` in `dir`, returning [`GitError::BackendError`] on a
/// non-zero exit (stderr carried in the message so the availability
/// classifier in [`crate::error`] can inspect it).
pub fn run(dir: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|source| GitError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(GitError::BackendError {
            args: args.join(" "),
            message: if stderr.trim().is_empty() {
                format!("git exited with status {}", output.status)
            } else {
                stderr.trim().to_string()
            },
        });
    }

    Ok(GitOutput { stdout, stderr })
}

/// Run `git <args>` and swallow a non-zero exit into `Ok(None)` — for
/// probes where "command failed" is itself meaningful information rather
/// than an error (e.g. "does this ref exist").
pub fn try_run(dir: &Path, args: &[&str]) -> Result<Option<GitOutput>, GitError> {
    match run(dir, args) {
        Ok(out) => Ok(Some(out)),
        Err(GitError::BackendError { .. }) => Ok(None),
        Err(other) => Err(other),
    }
}

/// Resolve the current commit id that `reference` points to, or `None` if
/// it does not exist.
pub fn rev_parse(dir: &Path, reference: &str) -> Result<Option<String>, GitError> {
    Ok(try_run(dir, &["rev-parse", "--verify", reference])?.map(|o| o.stdout.trim().to_string()))
}

/// Whether `reference` exists in `dir`'s repository.
pub fn ref_exists(dir: &Path, reference: &str) -> Result<bool, GitError> {
    Ok(rev_parse(dir, reference)?.is_some())
}
