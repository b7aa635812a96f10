//! Error taxonomy for git operations: rich enum variants so callers can
//! match on a specific failure mode instead of parsing stderr text.

use std::path::PathBuf;

/// Errors returned by [`crate::worktree`], [`crate::commit`] and
/// [`crate::fetch`] operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// A requested ref, branch, or remote was not found.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The worktree's local ref and the expected upstream ref disagree in a
    /// way a plain fetch+merge cannot resolve.
    #[error("ref conflict on `{ref_name}`: {message}")]
    RefConflict { ref_name: String, message: String },

    /// An operation that requires a clean worktree found uncommitted
    /// changes outside the sparse-checkout's managed files.
    #[error("dirty worktree at {}: {message}", path.display())]
    DirtyWorktree { path: PathBuf, message: String },

    /// `git push` failed after exhausting retries.
    #[error("push to `{remote}` failed after {attempts} attempts: {message}")]
    PushFailed {
        remote: String,
        attempts: u32,
        message: String,
    },

    /// An inbound `git merge` produced conflicts that cannot be resolved
    /// automatically.
    #[error("merge conflict: {message}")]
    MergeConflict { message: String },

    /// `git` itself could not be spawned, or exited non-zero for a reason
    /// not covered by a more specific variant.
    #[error("git backend error running `git {args}`: {message}")]
    BackendError { args: String, message: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fetch was requested while another fetch (periodic or explicit)
    /// was already running.
    #[error("a fetch is already in progress")]
    AlreadyInProgress,

    /// A fetch was requested while a commit was scheduled. Periodic and
    /// commit are mutually exclusive: the fetch is deferred rather than run
    /// concurrently, since the scheduler's own push will be followed by a
    /// fetch naturally once it completes.
    #[error("a commit is scheduled; fetch deferred until it completes")]
    Deferred,
}

impl GitError {
    /// Classify this error into the closed `gitStatus` reason set.
    #[must_use]
    pub fn availability_reason(&self) -> sparkle_core::error::AvailabilityReason {
        use sparkle_core::error::AvailabilityReason as R;
        match self {
            Self::MergeConflict { .. } => R::MergeConflict,
            Self::PushFailed { .. } => R::PushFailed,
            Self::NotFound { .. } | Self::RefConflict { .. } => R::Unknown,
            Self::DirtyWorktree { .. } => R::Unknown,
            Self::BackendError { message, .. } => classify_backend_message(message),
            Self::Io { .. } | Self::AlreadyInProgress | Self::Deferred => R::Unknown,
        }
    }
}

fn classify_backend_message(message: &str) -> sparkle_core::error::AvailabilityReason {
    use sparkle_core::error::AvailabilityReason as R;
    let lower = message.to_lowercase();
    if lower.contains("could not resolve host")
        || lower.contains("network is unreachable")
        || lower.contains("connection timed out")
        || lower.contains("could not read from remote")
    {
        R::NetworkError
    } else if lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("could not read username")
    {
        R::AuthError
    } else {
        R::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_network_errors() {
        let err = GitError::BackendError {
            args: "fetch origin".into(),
            message: "fatal: unable to access: Could not resolve host: example.com".into(),
        };
        assert_eq!(
            err.availability_reason(),
            sparkle_core::error::AvailabilityReason::NetworkError
        );
    }

    #[test]
    fn classifies_auth_errors() {
        let err = GitError::BackendError {
            args: "push origin".into(),
            message: "fatal: Authentication failed for 'https://example.com/repo.git'".into(),
        };
        assert_eq!(
            err.availability_reason(),
            sparkle_core::error::AvailabilityReason::AuthError
        );
    }

    #[test]
    fn merge_conflict_maps_directly() {
        let err = GitError::MergeConflict {
            message: "CONFLICT in data/foo.json".into(),
        };
        assert_eq!(
            err.availability_reason(),
            sparkle_core::error::AvailabilityReason::MergeConflict
        );
    }
}
