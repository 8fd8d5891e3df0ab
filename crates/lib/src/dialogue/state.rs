//! Per-conversation record restored at the start of each turn and written back at the end.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named step of the dialogue. Determines which other fields of the record are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    #[default]
    Initial,
    SelectingQuarter,
    SelectingLeaderId,
    AwaitingModificationChoice,
    ModifyingAgenda,
    AwaitingAgendaInput,
    ConfirmingAgendaChanges,
    ReviewingSessionContent,
    AwaitingContentInput,
    AwaitingRetryChoice,
}

/// Reporting quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn as_str(self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = ();

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Quarter::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(token))
            .ok_or(())
    }
}

/// How confirmed agenda points combine with the current agenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgendaEdit {
    Append,
    Replace,
}

/// The conversation record. Created with defaults on the first message of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default)]
    pub flow_state: FlowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<Quarter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_agenda: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda_edit: Option<AgendaEdit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_points: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_content: Option<String>,
}

impl ConversationState {
    /// Move to another step, keeping the collected fields.
    pub fn at(mut self, flow_state: FlowState) -> Self {
        self.flow_state = flow_state;
        self
    }

    /// Agenda that will be sent with the report request, if one was collected.
    pub fn agenda(&self) -> Option<&[String]> {
        self.pending_agenda
            .as_deref()
            .filter(|points| !points.is_empty())
    }
}
