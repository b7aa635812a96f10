//! Local git identity resolution.
//!
//! Shells out to `git config` rather than adding a `git2`/`gix`
//! dependency — just `std::process::Command` against the `git` binary
//! already required on the developer's machine.

use crate::clock;
use crate::model::Person;
use std::path::Path;
use std::process::Command;

/// Error resolving the local git identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to spawn `git config`: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("`git config --get {key}` is unset")]
    Unset { key: &'static str },
}

fn git_config(repo_root: &Path, key: &'static str) -> Result<String, IdentityError> {
    let output = Command::new("git")
        .args(["config", "--get", key])
        .current_dir(repo_root)
        .output()
        .map_err(IdentityError::Spawn)?;
    if !output.status.success() {
        return Err(IdentityError::Unset { key });
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        return Err(IdentityError::Unset { key });
    }
    Ok(value)
}

/// Resolve `user.name`/`user.email` from the git configuration visible at
/// `repo_root` (repo-local, falling back to global/system per git's own
/// resolution order), and stamp the current monotonic timestamp.
pub fn resolve_person(repo_root: &Path) -> Result<Person, IdentityError> {
    let name = git_config(repo_root, "user.name")?;
    let email = git_config(repo_root, "user.email")?;
    Ok(Person {
        name,
        email,
        timestamp: clock::next_timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_key_is_an_error_not_a_panic() {
        // Run against a directory with no git config at all reachable
        // (a fresh temp dir outside any repo); `git config --get` exits
        // non-zero rather than printing anything.
        let dir = std::env::temp_dir();
        let result = git_config(&dir, "sparkle.definitely-unset-test-key");
        assert!(matches!(result, Err(IdentityError::Unset { .. })));
    }
}
