//! Posts audit events to a webhook.

use std::time::Duration;

use async_trait::async_trait;
use ureq::Agent;

use super::{AuditError, AuditSubscriber};
use crate::domain::audit_event::AuditEvent;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends each event as a JSON `POST` body. Non-2xx responses count as failures.
pub struct HttpSubscriber {
    id: String,
    url: String,
    agent: Agent,
}

impl HttpSubscriber {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            id: format!("http:{url}"),
            url,
            agent,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn post_sync(agent: &Agent, url: &str, event: &AuditEvent) -> Result<(), AuditError> {
        agent
            .post(url)
            .send_json(event)
            .map_err(|e| AuditError::Delivery(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditSubscriber for HttpSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    async fn update(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let event = event.clone();

        // ureq blocks, keep it off the runtime threads
        tokio::task::spawn_blocking(move || Self::post_sync(&agent, &url, &event))
            .await
            .map_err(|e| AuditError::Delivery(e.to_string()))?
    }
}
