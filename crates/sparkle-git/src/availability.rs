//! Availability observer.
//!
//! A small pub/sub broadcaster, the same shape as
//! [`sparkle_core::aggregate::ChangeSink`] but for git reachability instead
//! of aggregate updates — kept as its own trait rather than reused because
//! the daemon wires the two into different SSE event types (`gitStatus`
//! vs. `aggregatesUpdated`).

use sparkle_core::error::AvailabilityReason;
use std::sync::{Arc, Mutex};

/// Subscriber notified on every availability change.
pub trait AvailabilitySink: Send + Sync {
    fn notify(&self, available: bool, reason: AvailabilityReason, details: Option<String>);
}

/// Broadcasts availability changes to every registered [`AvailabilitySink`].
#[derive(Default)]
pub struct AvailabilityObserver {
    sinks: Mutex<Vec<Arc<dyn AvailabilitySink>>>,
}

impl AvailabilityObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change(&self, sink: Arc<dyn AvailabilitySink>) {
        self.sinks.lock().expect("sinks lock poisoned").push(sink);
    }

    pub fn notify(&self, available: bool, reason: AvailabilityReason, details: Option<String>) {
        tracing::debug!(available, reason = %reason, "git availability change");
        for sink in self.sinks.lock().expect("sinks lock poisoned").iter() {
            sink.notify(available, reason, details.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Recording(StdMutex<Vec<(bool, AvailabilityReason)>>);

    impl AvailabilitySink for Recording {
        fn notify(&self, available: bool, reason: AvailabilityReason, _details: Option<String>) {
            self.0.lock().unwrap().push((available, reason));
        }
    }

    #[test]
    fn broadcasts_to_every_subscriber() {
        let observer = AvailabilityObserver::new();
        let a = Arc::new(Recording(StdMutex::new(Vec::new())));
        let b = Arc::new(Recording(StdMutex::new(Vec::new())));
        observer.on_change(a.clone());
        observer.on_change(b.clone());
        observer.notify(true, AvailabilityReason::PushSuccess, None);
        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap().len(), 1);
    }
}
