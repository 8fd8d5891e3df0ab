//! Leader table: one row per team member with the leader's id and a "new member" flag.

use super::ReferenceError;
use crate::config::ReferenceConfig;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;

/// One row of the table. `leader_id` is the coerced string form of the leader cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderRow {
    pub leader_id: String,
    pub member_name: Option<String>,
    pub new_member: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LeaderTable {
    rows: Vec<LeaderRow>,
}

impl LeaderTable {
    /// Parse the first worksheet of an xlsx/xls/ods workbook.
    pub fn from_workbook(bytes: Vec<u8>, columns: &ReferenceConfig) -> Result<Self, ReferenceError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| ReferenceError::Workbook(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ReferenceError::NoWorksheet)?
            .map_err(|e| ReferenceError::Workbook(e.to_string()))?;
        Self::from_range(&range, columns)
    }

    /// Parse a worksheet whose first row holds the column names.
    /// The leader column is required; flag and name columns are optional.
    pub fn from_range(range: &Range<Data>, columns: &ReferenceConfig) -> Result<Self, ReferenceError> {
        let mut rows = range.rows();
        let header: Vec<String> = rows
            .next()
            .map(|h| h.iter().map(cell_text).collect())
            .unwrap_or_default();
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
        };
        let leader_col = find(&columns.leader_column)
            .ok_or_else(|| ReferenceError::MissingColumn(columns.leader_column.clone()))?;
        let flag_col = find(&columns.new_member_column);
        let name_col = find(&columns.member_name_column);
        if flag_col.is_none() {
            log::debug!(
                "leader table: column {:?} not present, no new members will be reported",
                columns.new_member_column
            );
        }

        let parsed = rows
            .filter_map(|row| {
                let leader_id = row.get(leader_col).map(cell_text).unwrap_or_default();
                if leader_id.is_empty() {
                    return None;
                }
                Some(LeaderRow {
                    leader_id,
                    member_name: name_col
                        .and_then(|c| row.get(c))
                        .map(cell_text)
                        .filter(|s| !s.is_empty()),
                    new_member: flag_col.and_then(|c| row.get(c)).is_some_and(cell_flag),
                })
            })
            .collect();
        Ok(Self { rows: parsed })
    }

    /// Exact match against the coerced leader ids.
    pub fn contains(&self, leader_id: &str) -> bool {
        self.rows.iter().any(|r| r.leader_id == leader_id)
    }

    /// Names of the members flagged as new under this leader, in table order, without duplicates.
    pub fn new_members(&self, leader_id: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for row in self.rows.iter().filter(|r| r.leader_id == leader_id && r.new_member) {
            if let Some(name) = &row.member_name {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// String form of a cell. Integral numbers print without decimals so an id typed as
/// `12345` matches a numeric cell.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn cell_flag(cell: &Data) -> bool {
    match cell {
        Data::Bool(b) => *b,
        Data::Int(n) => *n != 0,
        Data::Float(f) => *f != 0.0,
        Data::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "verdadero" | "1" | "x" | "si" | "sí" | "yes"
        ),
        _ => false,
    }
}
