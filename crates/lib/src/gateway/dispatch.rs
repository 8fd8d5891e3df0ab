//! Fan inbound messages out to one worker task per conversation.
//!
//! Turns of the same conversation run one after another in arrival order; different
//! conversations run concurrently. A worker that stays idle stops, and the next message for
//! its conversation starts a fresh one.

use super::server::TurnProcessor;
use crate::channels::InboundMessage;
use crate::storage::ConversationKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

const WORKER_QUEUE: usize = 16;
const WORKER_IDLE: Duration = Duration::from_secs(300);

struct ConversationWorker {
    tx: mpsc::Sender<InboundMessage>,
    task: JoinHandle<()>,
}

pub struct TurnDispatcher {
    processor: Arc<TurnProcessor>,
    workers: HashMap<ConversationKey, ConversationWorker>,
    idle: Duration,
}

impl TurnDispatcher {
    pub fn new(processor: Arc<TurnProcessor>) -> Self {
        Self {
            processor,
            workers: HashMap::new(),
            idle: WORKER_IDLE,
        }
    }

    /// How long a conversation worker waits for its next message before stopping.
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Route messages until every sender of `inbound_rx` is dropped.
    pub async fn run(mut self, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = inbound_rx.recv().await {
            self.dispatch(msg);
        }
        log::debug!("dispatcher: inbound queue closed");
    }

    fn dispatch(&mut self, mut msg: InboundMessage) {
        self.workers.retain(|_, w| !w.task.is_finished());
        let key = msg.conversation.clone();

        if let Some(worker) = self.workers.get(&key) {
            match worker.tx.try_send(msg) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    log::warn!("inbound {}: too many pending messages, dropping one", key);
                    return;
                }
                // Worker is winding down after idling; it finishes before the new one starts.
                Err(TrySendError::Closed(returned)) => msg = returned,
            }
        }

        let previous = self.workers.remove(&key).map(|w| w.task);
        let worker = self.spawn_worker(key.clone(), previous);
        if let Err(e) = worker.tx.try_send(msg) {
            log::warn!("inbound {}: cannot queue message: {}", key, e);
        }
        self.workers.insert(key, worker);
    }

    fn spawn_worker(&self, key: ConversationKey, previous: Option<JoinHandle<()>>) -> ConversationWorker {
        let (tx, mut rx) = mpsc::channel::<InboundMessage>(WORKER_QUEUE);
        let processor = self.processor.clone();
        let idle = self.idle;
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            log::debug!("conversation {}: worker started", key);
            loop {
                match tokio::time::timeout(idle, rx.recv()).await {
                    Ok(Some(msg)) => processor.process(msg).await,
                    Ok(None) => break,
                    Err(_) => {
                        rx.close();
                        while let Some(msg) = rx.recv().await {
                            processor.process(msg).await;
                        }
                        break;
                    }
                }
            }
            log::debug!("conversation {}: worker stopped", key);
        });
        ConversationWorker { tx, task }
    }
}
