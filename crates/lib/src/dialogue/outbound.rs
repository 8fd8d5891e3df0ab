//! Messages the controller produces for a turn. Channels decide how to render them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Content type channels use for the hero card attachment.
pub const HERO_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.hero";

/// A quick-reply button: `title` is shown, `value` is sent back as the user's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAction {
    pub title: String,
    pub value: String,
}

impl CardAction {
    /// Button whose value is its label.
    pub fn im_back(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            title: label.clone(),
            value: label,
        }
    }
}

/// Card with a title, subtitle and a single button opening a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroCard {
    pub title: String,
    pub subtitle: String,
    pub button_title: String,
    pub url: String,
}

impl HeroCard {
    /// Bot Framework attachment: `{ contentType, content: { title, subtitle, buttons: [openUrl] } }`.
    pub fn to_attachment(&self) -> Value {
        json!({
            "contentType": HERO_CARD_CONTENT_TYPE,
            "content": {
                "title": self.title,
                "subtitle": self.subtitle,
                "buttons": [
                    {
                        "type": "openUrl",
                        "title": self.button_title,
                        "value": self.url,
                    }
                ]
            }
        })
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    /// Text followed by quick-reply buttons.
    SuggestedActions {
        text: String,
        actions: Vec<CardAction>,
    },
    Card(HeroCard),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text(text.into())
    }

    /// Quick replies whose values equal their labels.
    pub fn choices(text: impl Into<String>, labels: &[&str]) -> Self {
        OutboundMessage::SuggestedActions {
            text: text.into(),
            actions: labels.iter().map(|l| CardAction::im_back(*l)).collect(),
        }
    }

    /// Plain-text rendering for channels without buttons or cards (and for logs).
    pub fn plain_text(&self) -> String {
        match self {
            OutboundMessage::Text(text) => text.clone(),
            OutboundMessage::SuggestedActions { text, actions } => {
                let labels: Vec<&str> = actions.iter().map(|a| a.title.as_str()).collect();
                format!("{} [{}]", text, labels.join(" | "))
            }
            OutboundMessage::Card(card) => {
                format!("{}\n{}\n{}: {}", card.title, card.subtitle, card.button_title, card.url)
            }
        }
    }
}
