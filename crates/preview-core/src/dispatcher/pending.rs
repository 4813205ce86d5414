//! Correlation table for host → surface commands awaiting an acknowledgment.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

struct PendingRequest {
    command: String,
    issued_at: Instant,
    deadline: Instant,
    reply: oneshot::Sender<bool>,
}

/// At most one entry per correlation id; ids are fresh UUIDs and never reused.
#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    /// Registers a new request and returns its id with the acknowledgment receiver.
    pub(crate) fn register(&self, command: &str, timeout: Duration) -> (String, oneshot::Receiver<bool>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        let entry = PendingRequest {
            command: command.to_string(),
            issued_at: now,
            deadline: now + timeout,
            reply: tx,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id.clone(), entry);
        }
        (id, rx)
    }

    /// Completes the request for `id`. Unknown or already-expired ids return `false`.
    pub(crate) fn resolve(&self, id: &str, command: &str, handled: bool) -> bool {
        let entry = match self.entries.lock() {
            Ok(mut entries) => entries.remove(id),
            Err(_) => None,
        };
        match entry {
            Some(entry) => {
                if entry.command != command {
                    tracing::debug!(target: "preview::dispatcher", request_id = %id, expected = %entry.command, got = %command, "acknowledgment for a different command");
                }
                tracing::trace!(target: "preview::dispatcher", request_id = %id, waited_ms = entry.issued_at.elapsed().as_millis() as u64, "command acknowledged");
                entry.reply.send(handled).is_ok()
            }
            None => false,
        }
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        self.entries
            .lock()
            .map(|mut e| e.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Drops every entry whose deadline has passed. Returns how many were dropped.
    pub(crate) fn sweep_expired(&self, now: Instant) -> usize {
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, e| e.deadline > now);
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}
