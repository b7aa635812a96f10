//! The `/api/events` Server-Sent-Events channel.
//!
//! Fan-out broadcast: one message is written to every active subscriber's
//! channel; a per-subscriber write failure (a full or disconnected channel)
//! silently drops that subscriber. Kept as
//! its own small pub/sub type rather than reusing
//! [`sparkle_core::aggregate::ChangeSink`] because the daemon also needs to
//! broadcast non-aggregate events (`heartbeat`, `countdown`, `gitStatus`).

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// One already-formatted SSE frame (`event: ...\ndata: ...\n\n`).
pub type Frame = String;

pub fn format_frame<T: Serialize>(event: &str, payload: &T) -> Frame {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    format!("event: {event}\ndata: {data}\n\n")
}

/// Broadcasts formatted SSE frames to every connected `/api/events` client.
#[derive(Default)]
pub struct SseHub {
    subscribers: Mutex<HashMap<u64, Sender<Frame>>>,
    next_id: AtomicU64,
}

impl SseHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber, returning its id (for [`Self::unsubscribe`])
    /// and the receiving end of its channel.
    pub fn subscribe(&self) -> (u64, Receiver<Frame>) {
        let (tx, rx) = mpsc::channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().expect("sse subscribers lock poisoned").insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().expect("sse subscribers lock poisoned").remove(&id);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("sse subscribers lock poisoned").len()
    }

    /// Broadcast one named event to every subscriber. A subscriber whose
    /// send fails (channel full/disconnected) is dropped on the spot.
    pub fn broadcast<T: Serialize>(&self, event: &str, payload: &T) {
        let frame = format_frame(event, payload);
        let mut subs = self.subscribers.lock().expect("sse subscribers lock poisoned");
        subs.retain(|_, tx| tx.send(frame.clone()).is_ok());
    }

    /// Send a pre-formatted frame to exactly one subscriber (used for the
    /// connect-time `connected`/`gitStatus` frames).
    pub fn send_to(&self, id: u64, frame: Frame) {
        let subs = self.subscribers.lock().expect("sse subscribers lock poisoned");
        if let Some(tx) = subs.get(&id) {
            let _ = tx.send(frame);
        }
    }

    /// Drop every subscriber's channel, closing their SSE streams.
    pub fn close_all(&self) {
        self.subscribers.lock().expect("sse subscribers lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broadcast_reaches_all_subscribers() {
        let hub = SseHub::new();
        let (_id_a, rx_a) = hub.subscribe();
        let (_id_b, rx_b) = hub.subscribe();
        hub.broadcast("heartbeat", &json!({"timestamp": "t"}));
        assert!(rx_a.recv().unwrap().starts_with("event: heartbeat"));
        assert!(rx_b.recv().unwrap().contains("\"timestamp\":\"t\""));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = SseHub::new();
        let (id, rx) = hub.subscribe();
        hub.unsubscribe(id);
        hub.broadcast("heartbeat", &json!({}));
        assert!(rx.recv().is_err());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn dead_subscriber_is_pruned_on_broadcast() {
        let hub = SseHub::new();
        let (_id, rx) = hub.subscribe();
        drop(rx);
        hub.broadcast("heartbeat", &json!({}));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn frame_format_has_event_and_data_lines() {
        let frame = format_frame("connected", &json!({"status": "ok"}));
        assert!(frame.starts_with("event: connected\n"));
        assert!(frame.contains("data: {\"status\":\"ok\"}\n"));
        assert!(frame.ends_with("\n\n"));
    }
}
