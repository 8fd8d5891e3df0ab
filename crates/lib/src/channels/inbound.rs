//! Inbound message from a channel: delivered to the gateway for one dialogue turn.

use crate::storage::ConversationKey;

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text(String),
    /// A user joined the conversation (Bot Framework `membersAdded`).
    MembersAdded,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Registry id of the channel that replies (e.g. "botframework").
    pub channel_id: String,
    /// Storage key. For Bot Framework the channel part is the activity's channelId
    /// (e.g. "msteams", "emulator").
    pub conversation: ConversationKey,
    pub event: InboundEvent,
}
