//! Chat channels. The Bot Framework connector is the transport the bot answers on.
//!
//! Channels turn transport payloads into [`InboundMessage`]s for the gateway and render the
//! controller's outbound messages back onto their transport.

mod activity;
mod bot_framework;
mod inbound;
mod registry;

pub use activity::{
    Activity, ActionButton, ChannelAccount, ConversationAccount, SuggestedActions,
};
pub use bot_framework::{BotFrameworkChannel, BOT_FRAMEWORK_CHANNEL};
pub use inbound::{InboundEvent, InboundMessage};
pub use registry::{ChannelHandle, ChannelRegistry};

/// Failure delivering an outbound message.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no reply route for conversation {0}")]
    UnknownConversation(String),
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}
