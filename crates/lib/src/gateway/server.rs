//! Gateway HTTP server: health check and Bot Framework activities on one port.

use super::dispatch::TurnDispatcher;
use crate::channels::{
    Activity, BotFrameworkChannel, ChannelHandle, ChannelRegistry, InboundEvent, InboundMessage,
};
use crate::config::{self, Config};
use crate::dialogue::{prompts, DialogueController, Notifier, OutboundMessage};
use crate::fileshare;
use crate::llm::OpenAiClient;
use crate::report::ReportClient;
use crate::storage::{self, ConversationKey, ConversationStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

const INBOUND_QUEUE: usize = 64;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Sender for inbound channel messages, drained by the per-conversation dispatcher.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    pub channel_registry: Arc<ChannelRegistry>,
    pub bot_framework: Arc<BotFrameworkChannel>,
}

/// Everything one dialogue turn needs: load the record, run the controller, store, reply.
pub struct TurnProcessor {
    controller: Arc<DialogueController>,
    store: Arc<dyn ConversationStore>,
    channels: Arc<ChannelRegistry>,
}

impl TurnProcessor {
    pub fn new(
        controller: Arc<DialogueController>,
        store: Arc<dyn ConversationStore>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            controller,
            store,
            channels,
        }
    }

    /// Process one inbound message. Failures are logged; the turn never panics the loop.
    pub async fn process(&self, msg: InboundMessage) {
        let key = &msg.conversation;
        let Some(handle) = self.channels.get(&msg.channel_id).await else {
            log::warn!("inbound {}: channel {} not registered", key, msg.channel_id);
            return;
        };
        let reply = ChannelReply {
            handle: handle.as_ref(),
            key,
        };
        let record = match self.store.get_or_default(key).await {
            Ok(record) => record,
            Err(e) => {
                log::warn!("inbound {}: cannot load conversation record: {}", key, e);
                reply.send_all(&[OutboundMessage::text(prompts::TURN_FAILED)]).await;
                return;
            }
        };
        let before = record.flow_state;
        let result = match &msg.event {
            InboundEvent::Text(text) => {
                self.controller
                    .handle_message_with(record, text, &reply)
                    .await
            }
            InboundEvent::MembersAdded => self.controller.start(),
        };
        log::info!("turn {}: {:?} -> {:?}", key, before, result.state.flow_state);
        if let Err(e) = self.store.set(key, &result.state).await {
            log::warn!("inbound {}: cannot save conversation record: {}", key, e);
        }
        reply.send_all(&result.messages).await;
    }
}

/// Replies to the conversation a turn came from. Progress notices go out immediately.
struct ChannelReply<'a> {
    handle: &'a dyn ChannelHandle,
    key: &'a ConversationKey,
}

impl ChannelReply<'_> {
    async fn send_all(&self, messages: &[OutboundMessage]) {
        for message in messages {
            if let Err(e) = self.handle.send(&self.key.conversation_id, message).await {
                log::warn!("inbound {}: send failed: {}", self.key, e);
                break;
            }
        }
    }
}

#[async_trait]
impl<'a> Notifier for ChannelReply<'a> {
    async fn notify(&self, message: OutboundMessage) {
        self.send_all(std::slice::from_ref(&message)).await;
    }
}

/// Wire the dialogue controller to the configured file share, report service and rewriter.
pub fn build_controller(config: &Config, config_path: &Path) -> DialogueController {
    let files = fileshare::from_config(config, config_path);
    if config.report_service.url.is_none() {
        log::warn!("report service url not configured; generation will fail until it is set");
    }
    let reports = Arc::new(ReportClient::new(&config.report_service));
    let controller = DialogueController::new(
        config.dialogue.clone(),
        config.reference.clone(),
        files,
        reports,
    );
    let rewriter = OpenAiClient::new(&config.rewrite);
    if rewriter.is_configured() {
        controller.with_rewriter(Arc::new(rewriter))
    } else {
        if config.dialogue.assistant_editing {
            log::warn!("assistant editing enabled but no rewrite endpoint configured; option hidden");
        }
        controller
    }
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
/// `config_path` locates the storage file and local share root when those are relative.
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to {}: inbound activities are not authenticated, expose it only behind a trusted proxy",
            bind
        );
    }

    let store = storage::from_config(&config, &config_path)
        .await
        .context("opening conversation storage")?;
    let controller = Arc::new(build_controller(&config, &config_path));
    let channel_registry = Arc::new(ChannelRegistry::new());
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);

    let bot_framework = Arc::new(BotFrameworkChannel::new(
        config.channels.bot_framework.connector_token.clone(),
    ));
    channel_registry.register(bot_framework.clone()).await;

    let processor = Arc::new(TurnProcessor::new(controller, store, channel_registry.clone()));
    let dispatcher = tokio::spawn(TurnDispatcher::new(processor).run(inbound_rx));

    let state = GatewayState {
        config: Arc::new(config.clone()),
        inbound_tx,
        channel_registry,
        bot_framework,
    };
    let app = Router::new()
        .route("/", get(health_http))
        .route("/api/messages", post(bot_framework_messages))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    dispatcher.abort();
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// POST /api/messages: receives a Bot Framework activity and queues it for the dialogue.
async fn bot_framework_messages(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            log::debug!("bot framework: invalid activity: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let Some(inbound) = state.bot_framework.accept(&activity).await else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for health checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "channels": state.channel_registry.ids().await,
    }))
}
