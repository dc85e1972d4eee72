//! Subscriber trait and delivery errors.

use async_trait::async_trait;

use crate::domain::audit_event::AuditEvent;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit delivery failed: {0}")]
    Delivery(String),
}

/// Receives audit events from the publisher.
///
/// Errors are logged by the publisher and otherwise ignored, so an
/// implementation should not retry on its own.
#[async_trait]
pub trait AuditSubscriber: Send + Sync {
    /// Registry key. Registering a second subscriber with the same id is a no-op.
    fn id(&self) -> &str;

    async fn update(&self, event: &AuditEvent) -> Result<(), AuditError>;
}
