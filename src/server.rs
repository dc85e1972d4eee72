//! Service startup and shutdown.
//!
//! Builds the storage backend, the deletion pipeline and the audit
//! subscribers, then runs until Ctrl-C. HTTP routing is left to the caller
//! of [`build_service`].

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::services::UrlService;
use crate::config::Config;
use crate::domain::deletion_worker::DeletionPipeline;
use crate::domain::repositories::UrlStorage;
use crate::infrastructure::audit::{AuditPublisher, FileSubscriber, HttpSubscriber};

/// Facade over whichever backend the configuration selected.
pub type SharedService = UrlService<dyn UrlStorage>;

/// Opens storage, verifies it, and starts the deletion pipeline.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened or fails its first ping.
pub async fn build_service(config: &Config) -> Result<SharedService> {
    let storage = config
        .storage_kind()
        .open(&config.base_url, &config.pg_settings())
        .await
        .context("Failed to open storage")?;

    storage.ping().await.context("Storage ping failed")?;

    let deletion = DeletionPipeline::start(Arc::clone(&storage), config.deletion_config());
    let audit = Arc::new(build_audit(config));

    Ok(UrlService::new(
        storage,
        deletion,
        audit,
        config.service_settings(),
    ))
}

/// Registers the subscribers the configuration enables.
pub fn build_audit(config: &Config) -> AuditPublisher {
    let publisher = AuditPublisher::new();

    if let Some(path) = &config.audit_file {
        publisher.subscribe(Arc::new(FileSubscriber::new(path)));
    }

    if let Some(url) = &config.audit_url {
        publisher.subscribe(Arc::new(HttpSubscriber::new(url)));
    }

    if publisher.is_empty() {
        tracing::info!("Audit disabled");
    }

    publisher
}

/// Runs the service until Ctrl-C, then drains deletes and closes storage.
///
/// # Errors
///
/// Returns an error if startup fails or storage cannot be closed cleanly.
pub async fn run(config: Config) -> Result<()> {
    let service = build_service(&config).await?;
    tracing::info!(
        backend = service.storage().backend_name(),
        atomic_batches = service.storage().atomic_batches(),
        "Service ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!(
        pending_deletes = service.pending_deletes().await,
        "Shutdown requested"
    );

    service
        .shutdown()
        .await
        .context("Failed to shut down cleanly")?;
    tracing::info!("Shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_service_with_memory_backend() {
        let config = Config::default();

        let service = build_service(&config).await.unwrap();

        assert_eq!(service.storage().backend_name(), "memory");
        assert!(service.audit().is_empty());
        service.shutdown().await.unwrap();
    }

    #[test]
    fn test_build_audit_registers_configured_subscribers() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            audit_file: Some(dir.path().join("audit.log").display().to_string()),
            audit_url: Some("http://127.0.0.1:9/audit".to_string()),
            ..Config::default()
        };

        assert_eq!(build_audit(&config).len(), 2);
    }
}
