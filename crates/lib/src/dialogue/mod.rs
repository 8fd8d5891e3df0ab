//! Conversation flow: the per-conversation record, agenda rules, outbound message shapes and the
//! controller that drives one turn at a time.

pub mod agenda;
mod controller;
mod outbound;
pub mod prompts;
mod state;

pub use controller::{Clock, DialogueController, Notifier, SystemClock, TurnResult};
pub use outbound::{CardAction, HeroCard, OutboundMessage, HERO_CARD_CONTENT_TYPE};
pub use state::{AgendaEdit, ConversationState, FlowState, Quarter};
