//! In-process fakes for gateway tests.

use super::server::TurnProcessor;
use crate::channels::{ChannelError, ChannelHandle, ChannelRegistry, InboundEvent, InboundMessage};
use crate::config::DialogueSettings;
use crate::dialogue::{DialogueController, OutboundMessage};
use crate::fileshare::{FileShare, FileShareError};
use crate::report::{ReportError, ReportRequest, ReportService};
use crate::storage::{ConversationKey, ConversationStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const TEST_CHANNEL: &str = "test";
pub const REPORT_URL: &str = "https://example.com/r.pptx";

pub struct EmptyShare;

#[async_trait]
impl FileShare for EmptyShare {
    async fn read(&self, name: &str) -> Result<Vec<u8>, FileShareError> {
        Err(FileShareError::NotFound(name.to_string()))
    }

    async fn write(&self, _name: &str, _bytes: &[u8]) -> Result<(), FileShareError> {
        Ok(())
    }
}

pub struct OkReports;

#[async_trait]
impl ReportService for OkReports {
    async fn generate(&self, _request: &ReportRequest) -> Result<String, ReportError> {
        Ok(REPORT_URL.to_string())
    }
}

/// Report service that signals `entered` and then holds the request until `release`.
#[derive(Default)]
pub struct GatedReports {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ReportService for GatedReports {
    async fn generate(&self, _request: &ReportRequest) -> Result<String, ReportError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(REPORT_URL.to_string())
    }
}

/// Channel that records every message it is asked to send.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
}

impl Recorder {
    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Poll for up to two seconds until `done` holds for the messages sent so far.
    pub async fn wait_until(&self, done: impl Fn(&[(String, OutboundMessage)]) -> bool) -> bool {
        for _ in 0..200 {
            if done(self.sent.lock().unwrap().as_slice()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl ChannelHandle for Recorder {
    fn id(&self) -> &str {
        TEST_CHANNEL
    }

    async fn send(&self, conversation_id: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), message.clone()));
        Ok(())
    }
}

pub fn inbound(conversation: &str, event: InboundEvent) -> InboundMessage {
    InboundMessage {
        channel_id: TEST_CHANNEL.to_string(),
        conversation: ConversationKey::new("emulator", conversation),
        event,
    }
}

/// Processor with a fixed leader "4021", an empty share and `recorder` registered as the channel.
pub async fn processor(
    reports: Arc<dyn ReportService>,
    store: Arc<dyn ConversationStore>,
    recorder: Arc<Recorder>,
) -> Arc<TurnProcessor> {
    let controller = DialogueController::new(
        DialogueSettings {
            fixed_leader_id: Some("4021".to_string()),
            ..DialogueSettings::default()
        },
        Default::default(),
        Arc::new(EmptyShare),
        reports,
    );
    let registry = Arc::new(ChannelRegistry::new());
    registry.register(recorder).await;
    Arc::new(TurnProcessor::new(Arc::new(controller), store, registry))
}
