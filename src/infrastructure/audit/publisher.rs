//! Subscriber registry and fan-out.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::audit_event::AuditEvent;

use super::AuditSubscriber;

/// Registry of audit subscribers keyed by id.
///
/// Delivery is at-most-once and best-effort. A failing subscriber is logged
/// and skipped; it never blocks the others or fails the caller. Nothing is
/// retried or buffered.
#[derive(Default)]
pub struct AuditPublisher {
    subscribers: RwLock<HashMap<String, Arc<dyn AuditSubscriber>>>,
}

impl AuditPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` under its id.
    ///
    /// Returns false and keeps the existing registration if the id is taken.
    pub fn subscribe(&self, subscriber: Arc<dyn AuditSubscriber>) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let id = subscriber.id().to_string();
        if subscribers.contains_key(&id) {
            tracing::debug!(subscriber = %id, "Audit subscriber already registered");
            return false;
        }

        tracing::info!(subscriber = %id, "Audit subscriber registered");
        subscribers.insert(id, subscriber);
        true
    }

    /// Removes the subscriber registered under `id`. Returns whether one was.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every subscriber, one after another.
    ///
    /// Returns how many subscribers accepted it.
    pub async fn notify(&self, event: &AuditEvent) -> usize {
        // snapshot so no lock is held across an await
        let snapshot: Vec<Arc<dyn AuditSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        let mut delivered = 0;
        for subscriber in snapshot {
            match subscriber.update(event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    metrics::counter!("audit_delivery_failed_total").increment(1);
                    tracing::warn!(
                        subscriber = subscriber.id(),
                        action = ?event.action,
                        error = %e,
                        "Audit delivery failed"
                    );
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit_event::AuditAction;
    use crate::infrastructure::audit::AuditError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        id: String,
        seen: Mutex<Vec<AuditEvent>>,
    }

    impl Recording {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AuditSubscriber for Recording {
        fn id(&self) -> &str {
            &self.id
        }

        async fn update(&self, event: &AuditEvent) -> Result<(), AuditError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl AuditSubscriber for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        async fn update(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Delivery("receiver down".to_string()))
        }
    }

    fn event() -> AuditEvent {
        AuditEvent::new(AuditAction::Shorten, "u1", "https://a.example/")
    }

    #[tokio::test]
    async fn test_notify_reaches_every_subscriber() {
        let publisher = AuditPublisher::new();
        let a = Recording::new("a");
        let b = Recording::new("b");
        publisher.subscribe(a.clone());
        publisher.subscribe(b.clone());

        assert_eq!(publisher.notify(&event()).await, 2);
        assert_eq!(a.seen.lock().unwrap().len(), 1);
        assert_eq!(b.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_others() {
        let publisher = AuditPublisher::new();
        let ok = Recording::new("ok");
        publisher.subscribe(Arc::new(Failing));
        publisher.subscribe(ok.clone());

        assert_eq!(publisher.notify(&event()).await, 1);
        assert_eq!(ok.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_same_id_keeps_first() {
        let publisher = AuditPublisher::new();
        let first = Recording::new("dup");
        let second = Recording::new("dup");

        assert!(publisher.subscribe(first.clone()));
        assert!(!publisher.subscribe(second.clone()));
        assert_eq!(publisher.len(), 1);

        publisher.notify(&event()).await;
        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert!(second.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let publisher = AuditPublisher::new();
        let a = Recording::new("a");
        publisher.subscribe(a.clone());

        assert!(publisher.unsubscribe("a"));
        assert!(!publisher.unsubscribe("a"));
        assert!(publisher.is_empty());
        assert_eq!(publisher.notify(&event()).await, 0);
        assert!(a.seen.lock().unwrap().is_empty());
    }
}
