//! Project and local configuration.
//!
//! A project-level file committed to the host repo describes where the
//! event store lives, while a local file inside the aggregates directory
//! (never committed — it is per-machine) holds the daemon's own runtime
//! preferences. Environment variables take precedence over both.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Project configuration: where the event-sourced branch lives relative to
/// the host repository. Read from the host repo's `package.json` under a
/// `sparkle_config` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub git_branch: String,
    pub directory: String,
    #[serde(default = "default_worktree_path")]
    pub worktree_path: String,
}

fn default_worktree_path() -> String {
    ".sparkle-worktree".to_string()
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    sparkle_config: Option<ProjectConfig>,
}

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no sparkle_config found in {path}")]
    Missing { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Load project config from `<repo_root>/package.json`'s `sparkle_config`
/// key. Returns [`ConfigError::Missing`] rather than a default — there is
/// no sane default branch/directory to fall back to.
pub fn load_project_config(repo_root: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = repo_root.join("package.json");
    let path_str = path.display().to_string();
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path_str.clone(),
        source,
    })?;
    let parsed: PackageJson = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path_str.clone(),
        source,
    })?;
    parsed
        .sparkle_config
        .ok_or(ConfigError::Missing { path: path_str })
}

/// Write `project` back into `<repo_root>/package.json`'s `sparkle_config`
/// key, preserving every other key already in the file. Creates a minimal `package.json` if none exists yet.
pub fn save_project_config(repo_root: &Path, project: &ProjectConfig) -> Result<(), ConfigError> {
    let path = repo_root.join("package.json");
    let path_str = path.display().to_string();
    let mut root: serde_json::Value = match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path_str.clone(),
            source,
        })?,
        Err(_) => serde_json::json!({}),
    };
    let config_value = serde_json::to_value(project).map_err(|source| ConfigError::Parse {
        path: path_str.clone(),
        source,
    })?;
    root.as_object_mut()
        .expect("package.json root is always an object")
        .insert("sparkle_config".to_string(), config_value);
    let rendered = serde_json::to_string_pretty(&root).map_err(|source| ConfigError::Parse {
        path: path_str.clone(),
        source,
    })?;
    std::fs::write(&path, rendered).map_err(|source| ConfigError::Io { path: path_str, source })
}

/// Local, per-machine daemon preferences, stored at
/// `<aggregates_dir>/config.json`. Never committed to the event branch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub fixed_port: Option<u16>,
    #[serde(default)]
    pub default_filter: Option<String>,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    #[serde(default)]
    pub no_client_timeout_mode: NoClientTimeoutMode,
}

/// How the daemon treats a no-client timeout: default 60s
/// idle shutdown, `api` mode 300s (for daemons driven by scripts rather
/// than a browser tab), `keep-alive` disables the timeout entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum NoClientTimeoutMode {
    #[default]
    #[serde(rename = "default")]
    Standard,
    #[serde(rename = "api")]
    Api,
    #[serde(rename = "keep-alive")]
    KeepAlive,
}

impl NoClientTimeoutMode {
    /// Idle duration before shutdown, or `None` for `keep-alive`.
    #[must_use]
    pub const fn idle_seconds(self) -> Option<u64> {
        match self {
            Self::Standard => Some(60),
            Self::Api => Some(300),
            Self::KeepAlive => None,
        }
    }
}

const fn default_debounce_ms() -> u64 {
    5_000
}

const fn default_fetch_interval_secs() -> u64 {
    30
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            fixed_port: None,
            default_filter: None,
            dark_mode: false,
            debounce_ms: default_debounce_ms(),
            fetch_interval_secs: default_fetch_interval_secs(),
            no_client_timeout_mode: NoClientTimeoutMode::default(),
        }
    }
}

/// Load the local config, falling back to defaults if absent or
/// unreadable — this file is advisory and a missing copy must never block
/// daemon startup.
#[must_use]
pub fn load_local_config(aggregates_dir: &Path) -> LocalConfig {
    let path = aggregates_dir.join("config.json");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return LocalConfig::default();
    };
    serde_json::from_str(&contents).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), error = %err, "ignoring malformed local config");
        LocalConfig::default()
    })
}

pub fn save_local_config(aggregates_dir: &Path, config: &LocalConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(aggregates_dir)?;
    let path = aggregates_dir.join("config.json");
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)
}

/// Effective runtime settings after applying environment overrides.
///
/// `SPARKLE_PORT` and `SPARKLE_DEBOUNCE_MS` take precedence over the local
/// config file, mirroring `resolve_config`'s env-var precedence.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub fixed_port: Option<u16>,
    pub debounce_ms: u64,
    pub fetch_interval_secs: u64,
    pub no_client_timeout_mode: NoClientTimeoutMode,
}

#[must_use]
pub fn resolve_effective(local: &LocalConfig) -> EffectiveConfig {
    let fixed_port = std::env::var("SPARKLE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .or(local.fixed_port);
    let debounce_ms = std::env::var("SPARKLE_DEBOUNCE_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(local.debounce_ms);
    EffectiveConfig {
        fixed_port,
        debounce_ms,
        fetch_interval_secs: local.fetch_interval_secs,
        no_client_timeout_mode: local.no_client_timeout_mode,
    }
}
