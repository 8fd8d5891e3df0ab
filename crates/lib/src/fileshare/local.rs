//! Local directory laid out like the share's inputs directory.

use super::{FileShare, FileShareError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct LocalFileShare {
    root: PathBuf,
}

impl LocalFileShare {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> Result<PathBuf, FileShareError> {
        let relative = std::path::Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(FileShareError::Api(format!("invalid file name: {}", name)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileShare for LocalFileShare {
    async fn read(&self, name: &str) -> Result<Vec<u8>, FileShareError> {
        let path = self.path(name)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileShareError::NotFound(name.to_string()),
            _ => FileShareError::Io(e),
        })
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), FileShareError> {
        let path = self.path(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}
