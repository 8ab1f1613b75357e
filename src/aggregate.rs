use crate::manifest::{LotRecord, LotStatus, ProductGroup};
use crate::reconcile::Session;
use serde::{Deserialize, Serialize};

/// A scan that matched no manifest lot. Never reclassified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedScan {
    pub scanned_text: String,
    /// Position of the scan in the session's scan stream.
    pub sequence: u64,
}

/// Immutable end-of-conference snapshot handed to persistence and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub groups: Vec<ProductGroup>,
    pub unmatched: Vec<UnmatchedScan>,
    pub matched_count: usize,
    pub pending_count: usize,
    pub unmatched_count: usize,
}

impl ReconciliationResult {
    fn lots_with(&self, status: LotStatus) -> impl Iterator<Item = &LotRecord> {
        self.groups
            .iter()
            .flat_map(|g| g.lots.iter())
            .filter(move |lot| lot.status == status)
    }

    /// Lots that were scanned.
    pub fn matched_lots(&self) -> impl Iterator<Item = &LotRecord> {
        self.lots_with(LotStatus::Matched)
    }

    /// Lots listed on the manifest but never scanned.
    pub fn pending_lots(&self) -> impl Iterator<Item = &LotRecord> {
        self.lots_with(LotStatus::Pending)
    }

    pub fn total_lots(&self) -> usize {
        self.matched_count + self.pending_count
    }
}

/// Count matched and pending lots plus unmatched scans. Pure.
pub fn summarize(session: &Session) -> ReconciliationResult {
    let (mut matched, mut pending) = (0, 0);
    for lot in session.groups.iter().flat_map(|g| g.lots.iter()) {
        match lot.status {
            LotStatus::Matched => matched += 1,
            LotStatus::Pending => pending += 1,
        }
    }

    ReconciliationResult {
        groups: session.groups.clone(),
        unmatched: session.unmatched.clone(),
        matched_count: matched,
        pending_count: pending,
        unmatched_count: session.unmatched.len(),
    }
}
