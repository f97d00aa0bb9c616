//! Run report - the engine's entire external output
//!
//! An ordered sequence of per-resource outcomes plus an overall success flag.
//! Presentation, exit-code mapping and log formatting are the caller's
//! responsibility.

use crate::resource::ResourceId;
use serde::Serialize;

/// Terminal status of one resource's convergence attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    /// Live state already matched, or a refresh-only resource received no
    /// signal and did not run
    Unchanged,
    /// Applying produced an actual change
    Changed,
    /// Applying (or probing) this resource failed
    Failed { error: String },
    /// A required dependency failed upstream; no attempt was made
    Skipped,
}

impl Status {
    pub fn is_changed(&self) -> bool {
        matches!(self, Status::Changed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed { .. })
    }
}

/// One (resource id, status) pair in apply order
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub id: ResourceId,
    #[serde(flatten)]
    pub status: Status,
}

/// Ordered outcome of one convergence run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub(crate) fn record(&mut self, id: ResourceId, status: Status) {
        self.entries.push(ReportEntry { id, status });
    }

    /// Overall success: true iff no resource failed.
    pub fn ok(&self) -> bool {
        !self.entries.iter().any(|e| e.status.is_failed())
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn status_of(&self, id: &ResourceId) -> Option<&Status> {
        self.entries.iter().find(|e| &e.id == id).map(|e| &e.status)
    }

    /// Position of a resource in the apply order, for ordering assertions.
    pub fn position_of(&self, id: &ResourceId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for entry in &self.entries {
            match entry.status {
                Status::Unchanged => summary.unchanged += 1,
                Status::Changed => summary.changed += 1,
                Status::Failed { .. } => summary.failed += 1,
                Status::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Per-status counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.failed + self.skipped
    }
}
