//! Thin HTTP client over the local daemon.
//!
//! Grounded on `sparkle_daemon::portfile`'s own probe (`ureq::get(...)`),
//! the same crate and call shape the daemon itself uses to detect a sibling
//! instance — the CLI and the daemon agree on what "reachable" means.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sparkle_core::config;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("sparkle is not configured for this repository: {0}")]
    ConfigMissing(#[from] config::ConfigError),

    #[error("could not reach the sparkle daemon after starting it")]
    DaemonUnreachable,

    #[error("failed to launch the sparkle daemon: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("daemon request failed: {0}")]
    Http(String),

    #[error("daemon returned malformed response: {0}")]
    Decode(#[from] std::io::Error),
}

const STARTUP_POLL_ATTEMPTS: u32 = 50;
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A connection to the daemon serving `repo_root`, starting it if no
/// instance currently answers.
pub struct DaemonClient {
    base_url: String,
}

impl DaemonClient {
    /// Resolve the data directory, probe for an already-running daemon, and
    /// spawn one if none answers. Exit code 2 is the caller's
    /// responsibility when this returns [`ClientError::DaemonUnreachable`].
    pub fn ensure_running(repo_root: &Path) -> Result<Self, ClientError> {
        let project = config::load_project_config(repo_root)?;
        let data_dir = repo_root.join(&project.worktree_path).join(&project.directory);

        if let Some(port) = sparkle_daemon::portfile::read(&data_dir) {
            if sparkle_daemon::portfile::responds(port) {
                return Ok(Self { base_url: format!("http://127.0.0.1:{port}") });
            }
        }

        spawn_daemon(repo_root)?;

        for _ in 0..STARTUP_POLL_ATTEMPTS {
            std::thread::sleep(STARTUP_POLL_INTERVAL);
            if let Some(port) = sparkle_daemon::portfile::read(&data_dir) {
                if sparkle_daemon::portfile::responds(port) {
                    return Ok(Self { base_url: format!("http://127.0.0.1:{port}") });
                }
            }
        }

        Err(ClientError::DaemonUnreachable)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let response = ureq::get(&url).call().map_err(|err| ClientError::Http(err.to_string()))?;
        response.into_json().map_err(ClientError::Decode)
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let response = ureq::post(&url).send_json(body).map_err(|err| ClientError::Http(err.to_string()))?;
        response.into_json().map_err(ClientError::Decode)
    }

    pub fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        let url = format!("{}{path}", self.base_url);
        ureq::post(&url).send_json(body).map_err(|err| ClientError::Http(err.to_string()))?;
        Ok(())
    }
}

/// Spawn the daemon binary as a detached background process rooted at
/// `repo_root`. Looks for a `sparkle-daemon` binary next to this one first
/// (a workspace-local install), falling back to `PATH`.
fn spawn_daemon(repo_root: &Path) -> Result<(), ClientError> {
    let program = sibling_daemon_binary().unwrap_or_else(|| PathBuf::from("sparkle-daemon"));
    std::process::Command::new(program)
        .arg(repo_root)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(ClientError::Spawn)?;
    Ok(())
}

fn sibling_daemon_binary() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    let name = if cfg!(windows) { "sparkle-daemon.exe" } else { "sparkle-daemon" };
    let candidate = dir.join(name);
    candidate.exists().then_some(candidate)
}
