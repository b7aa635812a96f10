//! Error taxonomy for sparkle-core.
//!
//! Every variant carries the HTTP status it maps to at the daemon surface
//! and a machine-readable `reason` string for the wire format, so the
//! daemon's request handlers never need to re-derive the mapping.

use std::fmt;

/// Machine-readable error kind, surfaced to clients as a `reason` string
/// alongside an HTTP status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SparkleError {
    /// Malformed item id, missing argument, unknown status string.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Item id not present.
    #[error("not found: {item_id}")]
    NotFound { item_id: String },

    /// `addDependency` would close a cycle.
    #[error("adding a dependency from {needing} to {needed} would create a cycle")]
    Cycle { needing: String, needed: String },

    /// A read requiring a consistent view arrived while a full rebuild is
    /// in progress.
    #[error("aggregates are being rebuilt, retry after rebuildCompleted")]
    ConcurrencyConflict,

    /// An inbound merge could not complete automatically. Surfaced via
    /// the `gitStatus` SSE event, not as a write failure.
    #[error("merge conflict: {message}")]
    MergeConflict { message: String },

    /// Project configuration is not present.
    #[error("project not configured")]
    ConfigMissing,

    /// Request arrived during shutdown.
    #[error("daemon is shutting down")]
    ShuttingDown,

    /// Unrecoverable startup failure (worktree setup, port bind).
    #[error("fatal: {message}")]
    Fatal { message: String },
}

impl SparkleError {
    /// HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Cycle { .. } => 409,
            Self::ConcurrencyConflict => 503,
            Self::MergeConflict { .. } => 409,
            Self::ConfigMissing => 503,
            Self::ShuttingDown => 503,
            Self::Fatal { .. } => 500,
        }
    }

    /// Stable wire identifier for the `reason` field of error responses.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Cycle { .. } => "cycle",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::MergeConflict { .. } => "merge_conflict",
            Self::ConfigMissing => "config_missing",
            Self::ShuttingDown => "shutting_down",
            Self::Fatal { .. } => "fatal",
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(item_id: impl Into<String>) -> Self {
        Self::NotFound {
            item_id: item_id.into(),
        }
    }
}

/// Availability reason, reported by the git layer over the `gitStatus` SSE
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityReason {
    PushSuccess,
    FetchSuccess,
    PushFailed,
    FetchFailed,
    NetworkError,
    AuthError,
    MergeConflict,
    PushTimeout,
    Unknown,
}

impl AvailabilityReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PushSuccess => "push-success",
            Self::FetchSuccess => "fetch-success",
            Self::PushFailed => "push-failed",
            Self::FetchFailed => "fetch-failed",
            Self::NetworkError => "network-error",
            Self::AuthError => "auth-error",
            Self::MergeConflict => "merge-conflict",
            Self::PushTimeout => "push-timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AvailabilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_spec() {
        assert_eq!(SparkleError::validation("x").http_status(), 400);
        assert_eq!(SparkleError::not_found("1").http_status(), 404);
        assert_eq!(
            SparkleError::Cycle {
                needing: "a".into(),
                needed: "b".into()
            }
            .http_status(),
            409
        );
        assert_eq!(SparkleError::ConcurrencyConflict.http_status(), 503);
        assert_eq!(SparkleError::ConfigMissing.http_status(), 503);
        assert_eq!(SparkleError::ShuttingDown.http_status(), 503);
        assert_eq!(
            SparkleError::Fatal {
                message: "x".into()
            }
            .http_status(),
            500
        );
    }

    #[test]
    fn availability_reason_strings_are_closed_set() {
        let all = [
            AvailabilityReason::PushSuccess,
            AvailabilityReason::FetchSuccess,
            AvailabilityReason::PushFailed,
            AvailabilityReason::FetchFailed,
            AvailabilityReason::NetworkError,
            AvailabilityReason::AuthError,
            AvailabilityReason::MergeConflict,
            AvailabilityReason::PushTimeout,
            AvailabilityReason::Unknown,
        ];
        let expected = [
            "push-success",
            "fetch-success",
            "push-failed",
            "fetch-failed",
            "network-error",
            "auth-error",
            "merge-conflict",
            "push-timeout",
            "unknown",
        ];
        for (reason, text) in all.iter().zip(expected) {
            assert_eq!(reason.as_str(), text);
        }
    }
}
