//! Daemon-wide shared state.
//!
//! Every handler receives a `&DaemonState` rather than reaching through a
//! static — the same explicit-dependency-injection shape
//! `sparkle_core::aggregate::Manager` and `sparkle_git::GitSync` already
//! use for their own internals.

use crate::sse::SseHub;
use crate::timeout::NoClientTimeout;
use sparkle_core::api::{SparkleApi, WriteNotifier};
use sparkle_core::config::EffectiveConfig;
use sparkle_git::GitSync;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

/// Bridges `sparkle_core`'s write path to the git commit scheduler without
/// either crate depending on the other.
pub struct GitNotifier(pub Arc<GitSync>);

impl WriteNotifier for GitNotifier {
    fn notify_file_created(&self, filename: &str) {
        self.0.notify_file_created(filename);
    }
}

/// Everything a request handler or background task needs, folded into one
/// value constructed once at startup.
pub struct DaemonState {
    pub api: Arc<SparkleApi>,
    pub git: Arc<GitSync>,
    pub sse: Arc<SseHub>,
    pub timeout: Arc<NoClientTimeout>,
    pub config: EffectiveConfig,
    pub repo_root: PathBuf,
    pub data_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    port: AtomicU16,
    shutting_down: AtomicBool,
    pub started_at: chrono::DateTime<chrono::Local>,
    tick_count: std::sync::atomic::AtomicU64,
}

impl DaemonState {
    #[must_use]
    pub fn new(
        api: Arc<SparkleApi>,
        git: Arc<GitSync>,
        sse: Arc<SseHub>,
        timeout: Arc<NoClientTimeout>,
        config: EffectiveConfig,
        repo_root: PathBuf,
        data_dir: PathBuf,
        static_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            api,
            git,
            sse,
            timeout,
            config,
            repo_root,
            data_dir,
            static_dir,
            port: AtomicU16::new(0),
            shutting_down: AtomicBool::new(false),
            started_at: chrono::Local::now(),
            tick_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Advance and return the accept-loop tick counter, used to stagger work cheaper to run less often than
    /// once a second.
    pub fn next_tick(&self) -> u64 {
        self.tick_count.fetch_add(1, Ordering::SeqCst)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }
}
