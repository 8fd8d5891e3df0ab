//! Meetings document: `{ "meetings": [ { "subject", "start", "body": { "agenda": [..] } } ] }`.
//!
//! Unknown fields are kept so the document can be written back after an agenda edit
//! without dropping data the bot does not read.

use super::ReferenceError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingsDocument {
    #[serde(default)]
    pub meetings: Vec<Meeting>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    #[serde(default)]
    pub subject: String,
    /// ISO-8601 timestamp, UTC. Kept as written; see [`Meeting::start_time`].
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub body: MeetingBody,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingBody {
    #[serde(default)]
    pub agenda: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meeting {
    /// Start time. Accepts RFC 3339 and offset-less timestamps (read as UTC, with or
    /// without fractional seconds). None when the field cannot be parsed.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.start.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Agenda points with blank entries dropped.
    pub fn agenda(&self) -> Vec<String> {
        self.body
            .agenda
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

impl MeetingsDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ReferenceError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec_pretty(&self) -> Result<Vec<u8>, ReferenceError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Index of the earliest meeting starting at or after `now`.
    pub fn next_meeting_index(&self, now: DateTime<Utc>) -> Option<usize> {
        self.meetings
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.start_time().map(|t| (i, t)))
            .filter(|(_, t)| *t >= now)
            .min_by_key(|(_, t)| *t)
            .map(|(i, _)| i)
    }

    pub fn next_meeting(&self, now: DateTime<Utc>) -> Option<&Meeting> {
        self.next_meeting_index(now).map(|i| &self.meetings[i])
    }
}
