//! Channel registry: register and lookup channels by id.

use super::ChannelError;
use crate::dialogue::OutboundMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle to a channel the gateway replies through.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "botframework").
    fn id(&self) -> &str;
    /// Deliver one outbound message to a conversation.
    async fn send(&self, conversation_id: &str, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Registry of channel ids to handles. Shared across gateway.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn ChannelHandle>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a handle, replacing any previous handle with the same id.
    pub async fn register(&self, handle: Arc<dyn ChannelHandle>) {
        let id = handle.id().to_string();
        if self.inner.write().await.insert(id.clone(), handle).is_some() {
            log::debug!("channel {} replaced", id);
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        let g = self.inner.read().await;
        g.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let g = self.inner.read().await;
        let mut ids: Vec<String> = g.keys().cloned().collect();
        ids.sort();
        ids
    }
}
