//! Bounded hand-off from request handlers to audit delivery.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::domain::audit_event::AuditEvent;

use super::AuditPublisher;

/// Events buffered ahead of the delivery task before new ones are dropped.
pub const AUDIT_QUEUE_CAPACITY: usize = 1024;

/// How long shutdown waits for queued events to be delivered.
pub const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One delivery task fed by a bounded channel.
///
/// Request handlers never wait on it: when the channel is full the event is
/// dropped and counted, which keeps a slow subscriber from piling up work.
pub struct AuditQueue {
    sender: RwLock<Option<mpsc::Sender<AuditEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditQueue {
    /// Spawns the delivery task on the current runtime. Outside a runtime the
    /// queue starts closed and drops everything.
    pub fn start(publisher: Arc<AuditPublisher>, capacity: usize) -> Self {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime, audit events will be dropped");
            return Self {
                sender: RwLock::new(None),
                worker: Mutex::new(None),
            };
        };

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = handle.spawn(run_audit_worker(publisher, rx));

        Self {
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues `event` for delivery. Returns false if it was dropped.
    pub fn push(&self, event: AuditEvent) -> bool {
        let sender = self
            .sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sender) = sender.as_ref() else {
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                metrics::counter!("audit_events_dropped_total").increment(1);
                tracing::warn!(action = ?event.action, "Audit queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Stops accepting events and lets the task deliver what is queued,
    /// aborting it after `drain_timeout`.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        drop(
            self.sender
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut worker) = worker else {
            return;
        };

        if tokio::time::timeout(drain_timeout, &mut worker).await.is_err() {
            worker.abort();
            let _ = worker.await;
            tracing::warn!(
                drain_timeout_ms = drain_timeout.as_millis() as u64,
                "Audit queue drain timed out, remaining events dropped"
            );
        }
    }
}

async fn run_audit_worker(publisher: Arc<AuditPublisher>, mut rx: mpsc::Receiver<AuditEvent>) {
    while let Some(event) = rx.recv().await {
        publisher.notify(&event).await;
    }
    tracing::debug!("Audit worker stopped");
}
