//! Startup sequence: load project configuration,
//! ensure the worktree exists, probe for an already-running daemon on the
//! configured/last-known port, and — if none answers — assemble every
//! long-lived piece (API, git sync, SSE hub, timeout clock) into one
//! [`DaemonState`] ready for [`crate::routes::serve`].

use crate::sse::SseHub;
use crate::state::{DaemonState, GitNotifier};
use crate::timeout::NoClientTimeout;
use sparkle_core::aggregate::Manager;
use sparkle_core::api::SparkleApi;
use sparkle_core::config;
use sparkle_core::globals::GlobalsStore;
use sparkle_core::store::EventStore;
use sparkle_git::{GitSync, WorktreeSpec};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Unrecoverable startup failure: the daemon exits
/// non-zero with this as its last log line.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("project not configured: {0}")]
    ConfigMissing(#[from] config::ConfigError),

    #[error(transparent)]
    Git(#[from] sparkle_git::GitError),

    #[error("failed to bind any port: {0}")]
    Bind(#[source] std::io::Error),
}

/// What [`launch`] decided to do: either this process should serve, an
/// existing daemon already answers and the caller should hand off to it
/// and exit, or the project has no
/// `sparkle_config` yet and the daemon should serve only the minimal
/// "configure me" surface.
pub enum LaunchOutcome {
    ExistingDaemon { port: u16 },
    Serve(Arc<DaemonState>),
    Unconfigured { repo_root: PathBuf, static_dir: Option<PathBuf> },
}

/// Run the full startup sequence: load config, ensure the worktree,
/// probe for an already-running daemon, and kick off a background
/// rebuild if needed. Starting the background tasks happens once
/// [`crate::routes::serve`] has bound a listener and knows its real port.
pub fn launch(repo_root: PathBuf, static_dir: Option<PathBuf>) -> Result<LaunchOutcome, StartError> {
    let project = match config::load_project_config(&repo_root) {
        Ok(project) => project,
        Err(config::ConfigError::Missing { .. }) => {
            return Ok(LaunchOutcome::Unconfigured { repo_root, static_dir })
        }
        Err(err) => return Err(err.into()),
    };
    let spec = WorktreeSpec {
        repo_root: repo_root.clone(),
        branch: project.git_branch.clone(),
        directory: project.directory.clone(),
        worktree_path: project.worktree_path.clone(),
    };
    let data_dir = sparkle_git::worktree::ensure_worktree(&spec)?;
    let aggregates_dir = data_dir.join(".aggregates");

    let local = config::load_local_config(&aggregates_dir);
    let effective = config::resolve_effective(&local);

    if let Some(port) = effective.fixed_port.or_else(|| crate::portfile::read(&data_dir)) {
        if crate::portfile::responds(port) {
            return Ok(LaunchOutcome::ExistingDaemon { port });
        }
    }

    let store = EventStore::new(data_dir.clone());
    let manager = Arc::new(Manager::new(store, aggregates_dir.clone()));
    let globals = GlobalsStore::new(aggregates_dir);

    let sse = Arc::new(SseHub::new());
    manager.on_change(Arc::new(AggregateBroadcast(sse.clone())));

    let manager_for_fetch = manager.clone();
    let on_changed_files: sparkle_git::ChangeFilesCallback = Arc::new(move |files: &[String]| {
        if let Err(err) = manager_for_fetch.invalidate_by_files(files) {
            tracing::warn!(error = %err, "failed to invalidate aggregates after fetch");
        }
    });

    let git = GitSync::start(
        spec,
        Duration::from_millis(effective.debounce_ms),
        Duration::from_secs(effective.fetch_interval_secs),
        on_changed_files,
    )?;
    git.on_availability_change(Arc::new(AvailabilityBroadcast(sse.clone())));

    let notifier: Arc<dyn sparkle_core::api::WriteNotifier> = Arc::new(GitNotifier(git.clone()));
    let api = Arc::new(SparkleApi::new(manager, globals, notifier));

    let timeout = Arc::new(NoClientTimeout::new(effective.no_client_timeout_mode));

    let state = Arc::new(DaemonState::new(
        api,
        git,
        sse,
        timeout,
        effective,
        repo_root,
        data_dir,
        static_dir,
    ));

    match state.api.manager().validate_all() {
        Ok(report) if !report.valid => spawn_background_rebuild(state.clone()),
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "aggregate validation failed at startup"),
    }

    Ok(LaunchOutcome::Serve(state))
}

struct AggregateBroadcast(Arc<SseHub>);

impl sparkle_core::aggregate::ChangeSink for AggregateBroadcast {
    fn notify(&self, item_ids: &[sparkle_core::ItemId], cause: sparkle_core::aggregate::ChangeCause) {
        let ids: Vec<&str> = item_ids.iter().map(sparkle_core::ItemId::as_str).collect();
        self.0.broadcast(
            "aggregatesUpdated",
            &serde_json::json!({"itemIds": ids, "reason": cause.as_str()}),
        );
    }
}

struct AvailabilityBroadcast(Arc<SseHub>);

impl sparkle_git::AvailabilitySink for AvailabilityBroadcast {
    fn notify(&self, available: bool, reason: sparkle_core::error::AvailabilityReason, details: Option<String>) {
        self.0.broadcast(
            "gitStatus",
            &serde_json::json!({
                "active": available,
                "reason": reason.as_str(),
                "details": details,
                "timestamp": sparkle_core::clock::next_timestamp(),
            }),
        );
    }
}

/// Background full rebuild.
fn spawn_background_rebuild(state: Arc<DaemonState>) {
    std::thread::spawn(move || {
        state.sse.broadcast("rebuildStarted", &serde_json::json!({}));
        let sse = state.sse.clone();
        let result = state.api.manager().rebuild_all(|current, total| {
            sse.broadcast("rebuildProgress", &serde_json::json!({"current": current, "total": total}));
        });
        match result {
            Ok(()) => state.sse.broadcast("rebuildCompleted", &serde_json::json!({})),
            Err(err) => state.sse.broadcast("rebuildFailed", &serde_json::json!({"error": err.to_string()})),
        }
    });
}

/// Open the OS default browser at `url`.
pub fn open_browser(url: &str) {
    let result = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        std::process::Command::new("cmd").args(["/C", "start", "", url]).status()
    } else {
        std::process::Command::new("xdg-open").arg(url).status()
    };
    if let Err(err) = result {
        tracing::warn!(error = %err, url, "failed to open browser");
    }
}
