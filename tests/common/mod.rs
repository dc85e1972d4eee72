#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use url_shortener::application::services::{ServiceSettings, UrlService};
use url_shortener::domain::deletion_worker::{DeletionPipeline, DeletionPipelineConfig};
use url_shortener::domain::repositories::UrlStorage;
use url_shortener::infrastructure::audit::AuditPublisher;
use url_shortener::infrastructure::persistence::MemoryStorage;

pub const BASE_URL: &str = "http://s/";

pub fn fast_deletion() -> DeletionPipelineConfig {
    DeletionPipelineConfig {
        queue_capacity: 100,
        workers: 2,
        batch_size: 10,
        flush_interval: Duration::from_millis(20),
        ..DeletionPipelineConfig::default()
    }
}

pub fn service_with<S>(storage: Arc<S>, audit: Arc<AuditPublisher>) -> UrlService<S>
where
    S: UrlStorage + 'static,
{
    let deletion = DeletionPipeline::start(storage.clone(), fast_deletion());
    UrlService::new(
        storage,
        deletion,
        audit,
        ServiceSettings {
            base_url: BASE_URL.to_string(),
            request_timeout: Duration::from_secs(2),
        },
    )
}

pub fn memory_service() -> UrlService<MemoryStorage> {
    service_with(Arc::new(MemoryStorage::new()), Arc::new(AuditPublisher::new()))
}
