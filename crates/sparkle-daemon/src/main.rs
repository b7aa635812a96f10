//! Daemon binary entry point.
//!
//! Resolves the repository root, runs the startup sequence in
//! [`sparkle_daemon::lifecycle::launch`], and either hands off to an
//! already-running daemon or serves until shutdown.

use sparkle_daemon::lifecycle::{self, LaunchOutcome, StartError};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(data_dir: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_env("SPARKLE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).compact();

    match data_dir.map(|dir| dir.join("daemon.log")) {
        Some(log_path) => match std::fs::File::create(&log_path) {
            Ok(file) => {
                registry
                    .with(stderr_layer)
                    .with(fmt::layer().with_writer(file).with_ansi(false).compact())
                    .init();
            }
            Err(err) => {
                registry.with(stderr_layer).init();
                tracing::warn!(error = %err, path = %log_path.display(), "failed to open daemon.log");
            }
        },
        None => registry.with(stderr_layer).init(),
    }
}

fn repo_root() -> anyhow::Result<PathBuf> {
    match env::args().nth(1) {
        Some(arg) => Ok(PathBuf::from(arg)),
        None => Ok(env::current_dir()?),
    }
}

fn static_dir() -> Option<PathBuf> {
    env::var_os("SPARKLE_STATIC_DIR").map(PathBuf::from)
}

fn main() -> anyhow::Result<()> {
    let repo_root = repo_root()?;

    // Peek the project config just far enough to find the data directory
    // before the real tracing subscriber (which wants to log into it) is
    // installed; a missing/unreadable config falls back to stderr-only
    // logging and lets `lifecycle::launch` report the real error.
    let data_dir_hint = sparkle_core::config::load_project_config(&repo_root)
        .ok()
        .map(|project| repo_root.join(&project.worktree_path).join(&project.directory));
    init_tracing(data_dir_hint.as_deref());

    match lifecycle::launch(repo_root, static_dir()) {
        Ok(LaunchOutcome::ExistingDaemon { port }) => {
            tracing::info!(port, "an existing daemon already answers on this port");
            lifecycle::open_browser(&format!("http://localhost:{port}"));
            Ok(())
        }
        Ok(LaunchOutcome::Serve(state)) => {
            let fixed_port = state.config.fixed_port;
            let waiter = state.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let port = waiter.port();
                    if port != 0 {
                        lifecycle::open_browser(&format!("http://localhost:{port}"));
                        return;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
            });
            sparkle_daemon::routes::serve(state, fixed_port)?;
            Ok(())
        }
        Ok(LaunchOutcome::Unconfigured { repo_root, static_dir }) => {
            tracing::info!("no sparkle_config found; serving the minimal configure-me surface");
            sparkle_daemon::routes::serve_unconfigured(repo_root, static_dir, None)?;
            Ok(())
        }
        Err(err @ StartError::ConfigMissing(_)) => {
            tracing::error!(error = %err, "sparkle is not configured for this repository");
            Err(err.into())
        }
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            Err(err.into())
        }
    }
}
