//! Git-as-transport sync layer: sparse-checkout worktree
//! bootstrap, debounced commit-and-push, periodic fetch, and availability
//! broadcasting, split out as its own crate because the daemon needs it
//! running continuously rather than as a one-shot CLI command.

#![forbid(unsafe_code)]

pub mod availability;
pub mod cli;
pub mod commit;
pub mod error;
pub mod fetch;
pub mod scheduler;
pub mod worktree;

pub use availability::{AvailabilityObserver, AvailabilitySink};
pub use commit::CommitResult;
pub use error::GitError;
pub use fetch::FetchResult;
pub use scheduler::CommitScheduler;
pub use worktree::WorktreeSpec;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Called with the event-store-relative filenames that changed after a
/// successful fetch, so the aggregate manager can invalidate them. Kept as a plain callback rather than a direct
/// dependency on `sparkle_core::aggregate::Manager` so this crate stays
/// ignorant of the aggregate cache's internals.
pub type ChangeFilesCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Ties worktree bootstrap, the commit scheduler, and a periodic fetch loop
/// into the single long-lived "git sync" facade the daemon holds for the
/// life of the process.
pub struct GitSync {
    pub spec: WorktreeSpec,
    pub observer: Arc<AvailabilityObserver>,
    scheduler: Arc<CommitScheduler>,
    fetch_stop: Arc<AtomicBool>,
    fetch_handle: Mutex<Option<JoinHandle<()>>>,
    fetch_in_progress: Arc<AtomicBool>,
}

impl GitSync {
    /// Bootstrap the worktree if needed, then start the commit scheduler
    /// and periodic fetch thread. `on_changed_files` is invoked after every
    /// fetch that actually moved HEAD.
    ///
    /// # Errors
    /// Propagates any [`GitError`] from worktree bootstrap.
    pub fn start(
        spec: WorktreeSpec,
        debounce: Duration,
        fetch_interval: Duration,
        on_changed_files: ChangeFilesCallback,
    ) -> Result<Arc<Self>, GitError> {
        worktree::ensure_worktree(&spec)?;

        let observer = Arc::new(AvailabilityObserver::new());
        let scheduler = CommitScheduler::spawn(spec.clone(), debounce, observer.clone());

        let fetch_stop = Arc::new(AtomicBool::new(false));
        let fetch_in_progress = Arc::new(AtomicBool::new(false));
        let fetch_spec = spec.clone();
        let fetch_observer = observer.clone();
        let stop_for_thread = fetch_stop.clone();
        let in_progress_for_thread = fetch_in_progress.clone();
        let scheduler_for_thread = scheduler.clone();
        let fetch_handle = std::thread::spawn(move || {
            const POLL: Duration = Duration::from_millis(200);
            while !stop_for_thread.load(Ordering::SeqCst) {
                let mut waited = Duration::ZERO;
                while waited < fetch_interval {
                    if stop_for_thread.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(POLL.min(fetch_interval - waited));
                    waited += POLL;
                }
                if scheduler_for_thread.is_scheduled() {
                    tracing::debug!("periodic fetch deferred: a commit is scheduled");
                    continue;
                }
                if in_progress_for_thread.swap(true, Ordering::SeqCst) {
                    continue;
                }
                let result = fetch::fetch_updates(&fetch_spec, &fetch_observer);
                in_progress_for_thread.store(false, Ordering::SeqCst);
                match result {
                    Ok(result) if result.changed => on_changed_files(&result.changed_filenames),
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "periodic fetch failed"),
                }
            }
        });

        Ok(Arc::new(Self {
            spec,
            observer,
            scheduler,
            fetch_stop,
            fetch_handle: Mutex::new(Some(fetch_handle)),
            fetch_in_progress,
        }))
    }

    /// Arm the debounced commit scheduler for a freshly written event file.
    pub fn notify_file_created(&self, filename: impl Into<String>) {
        self.scheduler.notify_file_created(filename);
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.scheduler.is_scheduled()
    }

    /// Flush any pending commit synchronously.
    ///
    /// # Errors
    /// Returns a [`GitError`] if the push ultimately fails.
    pub fn force_push_now(&self) -> Result<CommitResult, GitError> {
        self.scheduler.force_push_now()
    }

    /// Run a fetch immediately, outside the periodic timer. Coalesces with
    /// an in-flight fetch (periodic or another explicit request) rather
    /// than running two at once, reporting "already in progress" instead.
    /// Deferred rather than run at all while a commit is scheduled: fetch
    /// and commit are mutually exclusive, and the scheduler's own push will
    /// be followed by a fetch naturally once it completes.
    ///
    /// # Errors
    /// Returns a [`GitError`] on merge conflict, a failed fetch, or
    /// deferral ([`GitError::AlreadyInProgress`], [`GitError::Deferred`]).
    pub fn fetch_now(&self) -> Result<FetchResult, GitError> {
        if self.scheduler.is_scheduled() {
            return Err(GitError::Deferred);
        }
        if self.fetch_in_progress.swap(true, Ordering::SeqCst) {
            return Err(GitError::AlreadyInProgress);
        }
        let result = fetch::fetch_updates(&self.spec, &self.observer);
        self.fetch_in_progress.store(false, Ordering::SeqCst);
        result
    }

    pub fn on_availability_change(&self, sink: Arc<dyn AvailabilitySink>) {
        self.observer.on_change(sink);
    }

    /// Stop the scheduler and fetch threads. Safe to call more than once.
    pub fn shutdown(&self) {
        self.fetch_stop.store(true, Ordering::SeqCst);
        self.scheduler.shutdown();
        if let Some(handle) = self.fetch_handle.lock().expect("fetch handle lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GitSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}
