//! Appends audit events to a local file as JSON lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{AuditError, AuditSubscriber};
use crate::domain::audit_event::AuditEvent;

pub struct FileSubscriber {
    id: String,
    path: PathBuf,
    // serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl FileSubscriber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: format!("file:{}", path.display()),
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSubscriber for FileSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    async fn update(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}
