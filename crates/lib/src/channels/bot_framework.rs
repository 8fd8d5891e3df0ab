//! Bot Framework connector channel.
//!
//! Activities arrive on `POST /api/messages`. Replies are POSTed to
//! `{serviceUrl}/v3/conversations/{conversationId}/activities`, so the channel remembers the
//! service URL and the bot/user accounts of every conversation it has seen.

use super::activity::{Activity, ChannelAccount, ConversationAccount};
use super::inbound::{InboundEvent, InboundMessage};
use super::registry::ChannelHandle;
use super::ChannelError;
use crate::dialogue::OutboundMessage;
use crate::storage::ConversationKey;
use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub const BOT_FRAMEWORK_CHANNEL: &str = "botframework";
const MAX_ROUTES: usize = 10_000;

#[derive(Debug, Clone)]
struct ReplyRoute {
    service_url: String,
    bot: Option<ChannelAccount>,
    user: Option<ChannelAccount>,
    last_seen: u64,
}

pub struct BotFrameworkChannel {
    token: Option<String>,
    routes: RwLock<HashMap<String, ReplyRoute>>,
    max_routes: usize,
    activity_seq: AtomicU64,
    client: reqwest::Client,
}

impl BotFrameworkChannel {
    /// `token` is sent as a bearer token with every reply when set.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            routes: RwLock::new(HashMap::new()),
            max_routes: MAX_ROUTES,
            activity_seq: AtomicU64::new(0),
            client: reqwest::Client::new(),
        }
    }

    /// Number of conversations whose reply route is kept; the least recently active is
    /// forgotten first.
    pub fn with_route_limit(mut self, max_routes: usize) -> Self {
        self.max_routes = max_routes.max(1);
        self
    }

    /// Turn an incoming activity into an inbound message and remember where to reply.
    /// Activities the dialogue does not handle (typing, bot-only joins, ...) yield None.
    pub async fn accept(&self, activity: &Activity) -> Option<InboundMessage> {
        let conversation = activity.conversation.as_ref()?;
        let event = if activity.is_message() {
            InboundEvent::Text(activity.text.clone().unwrap_or_default())
        } else if activity.adds_user() {
            InboundEvent::MembersAdded
        } else {
            log::debug!("bot framework: ignoring {} activity", activity.typ);
            return None;
        };
        if let Some(service_url) = &activity.service_url {
            let mut routes = self.routes.write().await;
            if !routes.contains_key(&conversation.id) && routes.len() >= self.max_routes {
                let oldest = routes
                    .iter()
                    .min_by_key(|(_, route)| route.last_seen)
                    .map(|(id, _)| id.clone());
                if let Some(id) = oldest {
                    log::debug!("bot framework: forgetting reply route for {}", id);
                    routes.remove(&id);
                }
            }
            routes.insert(
                conversation.id.clone(),
                ReplyRoute {
                    service_url: service_url.clone(),
                    bot: activity.recipient.clone(),
                    user: activity.from.clone(),
                    last_seen: self.activity_seq.fetch_add(1, Ordering::Relaxed),
                },
            );
        }
        let source = activity
            .channel_id
            .clone()
            .unwrap_or_else(|| BOT_FRAMEWORK_CHANNEL.to_string());
        Some(InboundMessage {
            channel_id: BOT_FRAMEWORK_CHANNEL.to_string(),
            conversation: ConversationKey::new(source, conversation.id.clone()),
            event,
        })
    }
}

fn activities_url(service_url: &str, conversation_id: &str) -> Result<Url, ChannelError> {
    let invalid = || ChannelError::Api(format!("invalid service url: {}", service_url));
    let mut url = Url::parse(service_url).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["v3", "conversations", conversation_id, "activities"]);
    Ok(url)
}

#[async_trait]
impl ChannelHandle for BotFrameworkChannel {
    fn id(&self) -> &str {
        BOT_FRAMEWORK_CHANNEL
    }

    async fn send(&self, conversation_id: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        let route = self
            .routes
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownConversation(conversation_id.to_string()))?;
        let mut activity = Activity::from_outbound(message);
        activity.conversation = Some(ConversationAccount {
            id: conversation_id.to_string(),
        });
        activity.from = route.bot;
        activity.recipient = route.user;

        let url = activities_url(&route.service_url, conversation_id)?;
        let mut req = self.client.post(url).json(&activity);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}
