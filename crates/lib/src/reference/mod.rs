//! Reference data read from the file share: the leader table (xlsx) and the meetings document (JSON).

mod leaders;
mod meetings;

pub use leaders::{LeaderRow, LeaderTable};
pub use meetings::{Meeting, MeetingBody, MeetingsDocument};

use crate::fileshare::FileShareError;

/// Failure loading a reference file. Fetch failures keep the share's error so callers can
/// tell a missing file apart from a transport problem.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error(transparent)]
    Fetch(#[from] FileShareError),
    #[error("cannot read workbook: {0}")]
    Workbook(String),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReferenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReferenceError::Fetch(FileShareError::NotFound(_)))
    }

    /// The file exists but its content is not what the bot expects.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ReferenceError::Workbook(_)
                | ReferenceError::NoWorksheet
                | ReferenceError::MissingColumn(_)
                | ReferenceError::Json(_)
        )
    }
}
