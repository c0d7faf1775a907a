use serde::Serialize;

use crate::error::Result;
use crate::remote::ShiftRepository;
use crate::schedule::entry::{CellKey, ShiftEntry};

/// Snapshot of the pending buffer, ready to be sent to the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct SavePlan {
    pub upserts: Vec<ShiftEntry>,
    pub deletes: Vec<CellKey>,
    pub(crate) revisions: Vec<(CellKey, u64)>,
    pub(crate) delete_chunk_size: usize,
}

impl SavePlan {
    /// Upserts go out as one bulk write, deletes in fixed-size chunks.
    /// Remote writes that succeed before a later failure are not rolled back.
    pub async fn submit(&self, repo: &dyn ShiftRepository) -> Result<()> {
        if !self.upserts.is_empty() {
            repo.upsert_shifts(&self.upserts).await?;
            tracing::debug!(rows = self.upserts.len(), "Upserted shifts");
        }
        for chunk in self.deletes.chunks(self.delete_chunk_size.max(1)) {
            repo.delete_shifts(chunk).await?;
            tracing::debug!(rows = chunk.len(), "Deleted shifts");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// A persisted change worth telling the employee about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ShiftNotice {
    Added { entry: ShiftEntry },
    Changed { before: ShiftEntry, after: ShiftEntry },
    Removed { entry: ShiftEntry },
}

impl ShiftNotice {
    pub fn employee_id(&self) -> &str {
        match self {
            ShiftNotice::Added { entry } | ShiftNotice::Removed { entry } => &entry.employee_id,
            ShiftNotice::Changed { after, .. } => &after.employee_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    pub upserted: usize,
    pub deleted: usize,
    pub notices: Vec<ShiftNotice>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    NothingToSave,
    Saved(SaveReport),
}
