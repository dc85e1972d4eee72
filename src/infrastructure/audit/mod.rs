//! Audit fan-out.
//!
//! [`AuditPublisher`] delivers each [`crate::domain::audit_event::AuditEvent`]
//! to every registered [`AuditSubscriber`]:
//! - [`FileSubscriber`] - appends one JSON line per event
//! - [`HttpSubscriber`] - posts the event as JSON to a webhook
//!
//! [`AuditQueue`] sits in front of the publisher so request handlers hand
//! events off without waiting on delivery.

mod file_subscriber;
mod http_subscriber;
mod publisher;
mod queue;
mod subscriber;

pub use file_subscriber::FileSubscriber;
pub use http_subscriber::HttpSubscriber;
pub use publisher::AuditPublisher;
pub use queue::{AUDIT_DRAIN_TIMEOUT, AUDIT_QUEUE_CAPACITY, AuditQueue};
pub use subscriber::{AuditError, AuditSubscriber};
