//! Commit scheduler: debounces bursts of
//! writes into a single commit-and-push, run on its own OS thread fed by a
//! channel. Nothing in this workspace pulls in an async runtime
//! (`tiny_http` and the rest of the daemon stack are synchronous).

use crate::availability::AvailabilityObserver;
use crate::commit::{self, DEFAULT_RETRIES};
use crate::error::GitError;
use crate::worktree::WorktreeSpec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum Message {
    FileCreated(String),
    ForceNow(Sender<Result<commit::CommitResult, GitError>>),
    Shutdown,
}

/// Debounces `notify_file_created` calls into one `commitAndPush` per quiet
/// period.
pub struct CommitScheduler {
    sender: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
    scheduled: Arc<AtomicBool>,
}

impl CommitScheduler {
    /// Spawn the scheduler thread. `debounce` is the quiet period that must
    /// elapse after the last `notify_file_created` before a commit fires.
    #[must_use]
    pub fn spawn(spec: WorktreeSpec, debounce: Duration, observer: Arc<AvailabilityObserver>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Message>();
        let scheduled = Arc::new(AtomicBool::new(false));
        let scheduled_thread = scheduled.clone();

        let handle = std::thread::spawn(move || {
            let mut pending: HashSet<String> = HashSet::new();
            let mut deadline: Option<Instant> = None;

            loop {
                let timeout = deadline.map_or(Duration::from_secs(3600), |d| {
                    d.saturating_duration_since(Instant::now())
                });

                match rx.recv_timeout(timeout) {
                    Ok(Message::FileCreated(filename)) => {
                        pending.insert(filename);
                        deadline = Some(Instant::now() + debounce);
                        scheduled_thread.store(true, Ordering::SeqCst);
                    }
                    Ok(Message::ForceNow(reply)) => {
                        let filenames: Vec<String> = pending.drain().collect();
                        deadline = None;
                        scheduled_thread.store(false, Ordering::SeqCst);
                        let result = commit::commit_and_push(
                            &spec,
                            &filenames,
                            DEFAULT_RETRIES,
                            &observer,
                        );
                        let _ = reply.send(result);
                    }
                    Ok(Message::Shutdown) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        if deadline.is_some() {
                            let filenames: Vec<String> = pending.drain().collect();
                            deadline = None;
                            scheduled_thread.store(false, Ordering::SeqCst);
                            if let Err(err) = commit::commit_and_push(
                                &spec,
                                &filenames,
                                DEFAULT_RETRIES,
                                &observer,
                            ) {
                                tracing::warn!(error = %err, "scheduled commit failed");
                            }
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Arc::new(Self {
            sender: tx,
            handle: Mutex::new(Some(handle)),
            scheduled,
        })
    }

    /// Arm the debounce timer for this filename.
    pub fn notify_file_created(&self, filename: impl Into<String>) {
        let _ = self.sender.send(Message::FileCreated(filename.into()));
    }

    /// `true` while a debounced commit is pending.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Flush immediately, bypassing the debounce window.
    pub fn force_push_now(&self) -> Result<commit::CommitResult, GitError> {
        let (tx, rx) = mpsc::channel();
        if self.sender.send(Message::ForceNow(tx)).is_err() {
            return Err(GitError::NotFound {
                message: "commit scheduler thread is not running".into(),
            });
        }
        rx.recv().unwrap_or_else(|_| {
            Err(GitError::NotFound {
                message: "commit scheduler thread dropped without replying".into(),
            })
        })
    }

    /// Stop the scheduler thread, joining it. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(handle) = self.handle.lock().expect("handle lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CommitScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
