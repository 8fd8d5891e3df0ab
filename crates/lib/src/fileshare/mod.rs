//! File share holding the bot's input files.
//!
//! Files are addressed by name relative to the configured inputs directory. Two backends:
//! the Azure Files REST API (SAS-authenticated) and a local directory with the same layout.

mod azure;
mod local;

pub use azure::AzureFileShare;
pub use local::LocalFileShare;

use crate::config::{self, Config, FileShareBackend};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FileShareError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file share request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("file share api error: {0}")]
    Api(String),
    #[error("file share io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file share not configured: {0}")]
    NotConfigured(String),
}

/// Read and overwrite files by name.
#[async_trait]
pub trait FileShare: Send + Sync {
    async fn read(&self, name: &str) -> Result<Vec<u8>, FileShareError>;

    /// Create or replace the file with `bytes`.
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), FileShareError>;

    /// Read a text file; invalid UTF-8 is replaced rather than rejected.
    async fn read_text(&self, name: &str) -> Result<String, FileShareError> {
        let bytes = self.read(name).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Build the configured backend. Missing Azure settings are reported on first use, not here,
/// so the gateway can still start and answer health checks.
pub fn from_config(config: &Config, config_path: &Path) -> Arc<dyn FileShare> {
    let share = &config.file_share;
    match share.backend {
        FileShareBackend::Local => {
            let root = config::resolve_local_share_root(config, config_path);
            log::info!("file share: local directory {}", root.display());
            Arc::new(LocalFileShare::new(root.join(share.inputs_path())))
        }
        FileShareBackend::Azure => {
            let file_share = AzureFileShare::from_config(share);
            log::info!("file share: azure files {}", file_share.describe());
            Arc::new(file_share)
        }
    }
}
