use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftKind {
    Normal,
    Locked,
    Absent,
    Holiday,
}

impl ShiftKind {
    /// Whether entries of this kind carry an hour value.
    pub fn has_hours(self) -> bool {
        matches!(self, ShiftKind::Normal | ShiftKind::Locked)
    }
}

impl std::fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftKind::Normal => write!(f, "normal"),
            ShiftKind::Locked => write!(f, "locked"),
            ShiftKind::Absent => write!(f, "absent"),
            ShiftKind::Holiday => write!(f, "holiday"),
        }
    }
}

/// Natural key of a grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub employee_id: String,
    pub work_date: NaiveDate,
}

impl CellKey {
    pub fn new(employee_id: impl Into<String>, work_date: NaiveDate) -> Self {
        Self {
            employee_id: employee_id.into(),
            work_date,
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.employee_id, self.work_date)
    }
}

/// One employee's record for one day. Serialized in the remote store's row
/// shape (`employee_id`, `work_date`, `type`, `hours`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftEntry {
    pub employee_id: String,
    pub work_date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: ShiftKind,
    pub hours: Option<f64>,
}

impl ShiftEntry {
    pub fn normal(employee_id: impl Into<String>, work_date: NaiveDate, hours: f64) -> Self {
        Self {
            employee_id: employee_id.into(),
            work_date,
            kind: ShiftKind::Normal,
            hours: Some(hours),
        }
    }

    pub fn locked(employee_id: impl Into<String>, work_date: NaiveDate, hours: f64) -> Self {
        Self {
            kind: ShiftKind::Locked,
            ..Self::normal(employee_id, work_date, hours)
        }
    }

    pub fn absent(employee_id: impl Into<String>, work_date: NaiveDate) -> Self {
        Self {
            employee_id: employee_id.into(),
            work_date,
            kind: ShiftKind::Absent,
            hours: None,
        }
    }

    pub fn holiday(employee_id: impl Into<String>, work_date: NaiveDate) -> Self {
        Self {
            kind: ShiftKind::Holiday,
            ..Self::absent(employee_id, work_date)
        }
    }

    pub fn key(&self) -> CellKey {
        CellKey::new(self.employee_id.clone(), self.work_date)
    }

    /// Hours that count towards totals.
    pub fn counted_hours(&self) -> f64 {
        if self.kind.has_hours() {
            self.hours.unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Drop hours from kinds that cannot carry them.
    pub fn normalized(mut self) -> Self {
        if !self.kind.has_hours() {
            self.hours = None;
        }
        self
    }

    /// Check a manually entered record before it touches any state.
    pub fn validate(&self) -> Result<()> {
        if self.employee_id.trim().is_empty() {
            return Err(RosterError::validation("employee id is required"));
        }
        if let Some(h) = self.hours {
            if !h.is_finite() || h < 0.0 {
                return Err(RosterError::validation(format!(
                    "hours must be a non-negative number, got {}",
                    h
                )));
            }
        }
        if self.kind.has_hours() {
            match self.hours {
                Some(h) if h > 0.0 => {}
                _ => {
                    return Err(RosterError::validation(format!(
                        "{} shifts require a positive hour value",
                        self.kind
                    )))
                }
            }
        }
        Ok(())
    }
}

/// A single pre-persistence change.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOperation {
    Upsert(ShiftEntry),
    Delete(CellKey),
}

impl EditOperation {
    pub fn key(&self) -> CellKey {
        match self {
            EditOperation::Upsert(entry) => entry.key(),
            EditOperation::Delete(key) => key.clone(),
        }
    }

    /// The operation that makes `key` hold `value`.
    pub fn to_state(key: &CellKey, value: Option<&ShiftEntry>) -> Self {
        match value {
            Some(entry) => EditOperation::Upsert(entry.clone()),
            None => EditOperation::Delete(key.clone()),
        }
    }

    pub fn is_upsert(&self) -> bool {
        matches!(self, EditOperation::Upsert(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn entry_serializes_as_remote_row() {
        let entry = ShiftEntry::normal("e1", date("2025-08-18"), 8.0);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["employee_id"], "e1");
        assert_eq!(json["work_date"], "2025-08-18");
        assert_eq!(json["type"], "normal");
        assert_eq!(json["hours"], 8.0);
    }

    #[test]
    fn holiday_row_with_hours_is_normalized() {
        let raw = r#"{"employee_id":"e2","work_date":"2025-12-24","type":"holiday","hours":8}"#;
        let entry: ShiftEntry = serde_json::from_str::<ShiftEntry>(raw).unwrap().normalized();
        assert_eq!(entry.kind, ShiftKind::Holiday);
        assert!(entry.hours.is_none());
        assert_eq!(entry.counted_hours(), 0.0);
    }

    #[test]
    fn validate_requires_employee() {
        let entry = ShiftEntry::normal("  ", date("2025-08-18"), 8.0);
        assert!(entry.validate().unwrap_err().is_validation());
    }

    #[test]
    fn validate_requires_hours_for_locked() {
        let mut entry = ShiftEntry::locked("e1", date("2025-08-18"), 6.0);
        assert!(entry.validate().is_ok());
        entry.hours = None;
        assert!(entry.validate().is_err());
        entry.hours = Some(0.0);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_and_nan() {
        let mut entry = ShiftEntry::normal("e1", date("2025-08-18"), -1.0);
        assert!(entry.validate().is_err());
        entry.hours = Some(f64::NAN);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn absent_entry_is_valid_without_hours() {
        assert!(ShiftEntry::absent("e1", date("2025-08-18")).validate().is_ok());
    }

    #[test]
    fn cell_key_display() {
        let key = CellKey::new("e1", date("2025-08-18"));
        assert_eq!(key.to_string(), "e1|2025-08-18");
    }

    #[test]
    fn to_state_picks_operation() {
        let key = CellKey::new("e1", date("2025-08-18"));
        assert_eq!(
            EditOperation::to_state(&key, None),
            EditOperation::Delete(key.clone())
        );
        let entry = ShiftEntry::normal("e1", date("2025-08-18"), 4.0);
        assert!(EditOperation::to_state(&key, Some(&entry)).is_upsert());
    }
}
