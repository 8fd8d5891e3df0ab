//! Conversation record storage, keyed per channel conversation.
//!
//! Records are read at the start of a turn and written once at the end; the last write wins.
//! Two backends: in-memory (development) and a JSON file that survives restarts.

use crate::config::{self, Config, StorageBackend};
use crate::dialogue::ConversationState;
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage key for one conversation on one channel.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConversationKey {
    pub channel_id: String,
    pub conversation_id: String,
}

impl ConversationKey {
    pub fn new(channel_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.conversation_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Keyed record store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, key: &ConversationKey) -> Result<Option<ConversationState>, StorageError>;

    async fn set(&self, key: &ConversationKey, state: &ConversationState) -> Result<(), StorageError>;

    /// The stored record, or a fresh default one for a conversation seen for the first time.
    async fn get_or_default(&self, key: &ConversationKey) -> Result<ConversationState, StorageError> {
        Ok(self.get(key).await?.unwrap_or_default())
    }
}

/// In-memory store. Records are lost on restart.
pub struct MemoryStorage {
    inner: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStorage {
    async fn get(&self, key: &ConversationKey) -> Result<Option<ConversationState>, StorageError> {
        Ok(self.inner.read().await.get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &ConversationKey, state: &ConversationState) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), state.clone());
        Ok(())
    }
}

/// JSON file store: the whole map is kept in memory and rewritten on every `set`.
/// Writes go to a temporary file renamed into place while holding an exclusive lock on
/// `<path>.lock`, so a crashed write never leaves a truncated file.
pub struct JsonFileStorage {
    path: PathBuf,
    entries: RwLock<HashMap<String, ConversationState>>,
}

impl JsonFileStorage {
    /// Load the store from `path`; a missing file starts empty, an unreadable one is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => HashMap::new(),
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        log::debug!(
            "conversation storage: loaded {} record(s) from {}",
            entries.len(),
            path.display()
        );
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn save(&self, entries: &HashMap<String, ConversationState>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_locked(&path, &json))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn write_locked(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let lock_path = path.with_extension("lock");
    let lock = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    FileExt::lock_exclusive(&lock)?;
    let tmp_path = path.with_extension("tmp");
    let result = std::fs::write(&tmp_path, bytes).and_then(|_| std::fs::rename(&tmp_path, path));
    let _ = FileExt::unlock(&lock);
    result.map_err(StorageError::from)
}

#[async_trait]
impl ConversationStore for JsonFileStorage {
    async fn get(&self, key: &ConversationKey) -> Result<Option<ConversationState>, StorageError> {
        Ok(self.entries.read().await.get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &ConversationKey, state: &ConversationState) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), state.clone());
        self.save(&entries).await
    }
}

/// Open the configured backend.
pub async fn from_config(
    config: &Config,
    config_path: &Path,
) -> Result<Arc<dyn ConversationStore>, StorageError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            log::info!("conversation storage: in memory");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::File => {
            let path = config::resolve_storage_path(config, config_path);
            log::info!("conversation storage: {}", path.display());
            Ok(Arc::new(JsonFileStorage::load(path).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{FlowState, Quarter};

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("reportbot-storage-test-{}", uuid::Uuid::new_v4()))
            .join("conversations.json")
    }

    #[test]
    fn key_joins_channel_and_conversation() {
        assert_eq!(ConversationKey::new("msteams", "42").to_string(), "msteams:42");
    }

    #[tokio::test]
    async fn memory_store_defaults_unknown_conversations() {
        let store = MemoryStorage::new();
        let key = ConversationKey::new("emulator", "c1");
        assert_eq!(store.get_or_default(&key).await.unwrap(), ConversationState::default());

        let state = ConversationState::default().at(FlowState::SelectingQuarter);
        store.set(&key, &state).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(state));
        assert!(store
            .get(&ConversationKey::new("emulator", "c2"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn file_store_survives_reload() {
        let path = temp_path();
        let key = ConversationKey::new("msteams", "7");
        let mut state = ConversationState::default().at(FlowState::SelectingLeaderId);
        state.quarter = Some(Quarter::Q1);
        {
            let store = JsonFileStorage::load(&path).await.unwrap();
            store.set(&key, &state).await.unwrap();
        }
        let reloaded = JsonFileStorage::load(&path).await.unwrap();
        assert_eq!(reloaded.get(&key).await.unwrap(), Some(state));
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStorage::load(&path).await.is_err());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
