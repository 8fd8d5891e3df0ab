//! Bot Framework activity wire types (the subset the bot reads and writes).

use crate::dialogue::OutboundMessage;
use serde::{Deserialize, Serialize};

pub const MESSAGE: &str = "message";
pub const CONVERSATION_UPDATE: &str = "conversationUpdate";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
}

/// `{ "type": "imBack", "title", "value" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    #[serde(rename = "type")]
    pub typ: String,
    pub title: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedActions {
    #[serde(default)]
    pub actions: Vec<ActionButton>,
}

/// Activity as POSTed to `/api/messages` and sent back to the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<SuggestedActions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.typ == MESSAGE
    }

    /// `conversationUpdate` that adds someone other than the bot (the recipient).
    pub fn adds_user(&self) -> bool {
        if self.typ != CONVERSATION_UPDATE {
            return false;
        }
        let bot_id = self.recipient.as_ref().map(|r| r.id.as_str());
        self.members_added
            .iter()
            .any(|m| Some(m.id.as_str()) != bot_id)
    }

    /// Message activity carrying one outbound message.
    pub fn from_outbound(message: &OutboundMessage) -> Self {
        let mut activity = Activity {
            typ: MESSAGE.to_string(),
            ..Activity::default()
        };
        match message {
            OutboundMessage::Text(text) => activity.text = Some(text.clone()),
            OutboundMessage::SuggestedActions { text, actions } => {
                activity.text = Some(text.clone());
                activity.suggested_actions = Some(SuggestedActions {
                    actions: actions
                        .iter()
                        .map(|a| ActionButton {
                            typ: "imBack".to_string(),
                            title: a.title.clone(),
                            value: a.value.clone(),
                        })
                        .collect(),
                });
            }
            OutboundMessage::Card(card) => activity.attachments = vec![card.to_attachment()],
        }
        activity
    }
}
