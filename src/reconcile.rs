// src/reconcile.rs

use crate::aggregate::{ReconciliationResult, UnmatchedScan, summarize};
use crate::manifest::{LotStatus, ProductGroup};
use tracing::{debug, info, warn};

/// What a single scan did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A pending lot was marked as matched.
    Matched { group: usize, lot: usize },
    /// The lot had already been matched; nothing changed.
    AlreadyMatched { group: usize, lot: usize },
    /// No lot carries this identifier; recorded as unmatched.
    Unmatched { sequence: u64 },
}

/// Live conference state for one manifest.
///
/// Group membership is fixed at [`Session::start`]; only lot status changes
/// and unmatched scans are appended. [`Session::finalize`] and
/// [`Session::cancel`] consume the session, so nothing can be applied after
/// either of them.
#[derive(Debug)]
pub struct Session {
    pub(crate) groups: Vec<ProductGroup>,
    pub(crate) unmatched: Vec<UnmatchedScan>,
    scans_applied: u64,
}

impl Session {
    pub fn start(groups: Vec<ProductGroup>) -> Self {
        let lots: usize = groups.iter().map(|g| g.lots.len()).sum();
        info!(groups = groups.len(), lots, "Conference session started");
        Self {
            groups,
            unmatched: Vec::new(),
            scans_applied: 0,
        }
    }

    pub fn groups(&self) -> &[ProductGroup] {
        &self.groups
    }

    pub fn unmatched(&self) -> &[UnmatchedScan] {
        &self.unmatched
    }

    /// Number of `apply_scan` calls so far, matched or not.
    pub fn scans_applied(&self) -> u64 {
        self.scans_applied
    }

    fn find(&self, scanned: &str) -> Option<(usize, usize)> {
        self.groups.iter().enumerate().find_map(|(gi, group)| {
            group
                .lots
                .iter()
                .position(|lot| lot.lot_identifier == scanned)
                .map(|li| (gi, li))
        })
    }

    /// Classify one decoded scan. Never fails.
    pub fn apply_scan(&mut self, scanned: &str) -> ScanOutcome {
        let sequence = self.scans_applied;
        self.scans_applied += 1;

        match self.find(scanned) {
            Some((gi, li)) => {
                let lot = &mut self.groups[gi].lots[li];
                if lot.status == LotStatus::Matched {
                    debug!(lot = %scanned, "Lot already matched");
                    ScanOutcome::AlreadyMatched { group: gi, lot: li }
                } else {
                    lot.status = LotStatus::Matched;
                    info!(lot = %scanned, product = %lot.product_name, "Lot matched");
                    ScanOutcome::Matched { group: gi, lot: li }
                }
            }
            None => {
                warn!(scanned = %scanned, sequence, "Scan matches no manifest lot");
                self.unmatched.push(UnmatchedScan {
                    scanned_text: scanned.to_string(),
                    sequence,
                });
                ScanOutcome::Unmatched { sequence }
            }
        }
    }

    /// Close the session and hand back its final snapshot.
    pub fn finalize(self) -> ReconciliationResult {
        let result = summarize(&self);
        info!(
            matched = result.matched_count,
            pending = result.pending_count,
            unmatched = result.unmatched_count,
            "Conference finalized"
        );
        result
    }

    /// Drop the session without producing a result.
    pub fn cancel(self) {
        info!(scans = self.scans_applied, "Conference cancelled, discarding session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::normalize::{PageFragment, normalize_pages};

    fn pages(text: &str) -> Vec<PageFragment> {
        text.lines()
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    fn scenario_session() -> Session {
        let normalized = normalize_pages(&pages(
            "00063 - PRODUCT X KG 100,5\n40 45 50,0 123456789012345",
        ));
        Session::start(manifest::parse(&normalized.text).unwrap())
    }

    fn two_lot_session() -> Session {
        Session::start(
            manifest::parse("00063 - KRAFT KG 10,0 40 45 5,0 111111111111 40 45 5,0 222222222222")
                .unwrap(),
        )
    }

    #[test]
    fn test_scenario_matched_lot() {
        let mut session = scenario_session();
        assert_eq!(session.groups()[0].product_name, "PRODUCT X");
        assert_eq!(session.groups()[0].lots[0].status, LotStatus::Pending);

        let outcome = session.apply_scan("123456789012345");
        assert_eq!(outcome, ScanOutcome::Matched { group: 0, lot: 0 });

        let result = session.finalize();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.pending_count, 0);
        assert_eq!(result.unmatched_count, 0);
    }

    #[test]
    fn test_scenario_unknown_scan() {
        let mut session = scenario_session();
        session.apply_scan("000000000000000");

        let result = session.finalize();
        assert_eq!(result.matched_count, 0);
        assert_eq!(result.pending_count, 1);
        assert_eq!(result.unmatched_count, 1);
        assert_eq!(result.unmatched[0].scanned_text, "000000000000000");
    }

    #[test]
    fn test_scenario_empty_document() {
        let normalized = normalize_pages(&[]);
        assert_eq!(
            manifest::parse(&normalized.text),
            Err(crate::error::ParseError::NoRecordsFound)
        );
    }

    #[test]
    fn test_scenario_double_scan() {
        let mut session = scenario_session();
        session.apply_scan("123456789012345");
        let second = session.apply_scan("123456789012345");
        assert_eq!(second, ScanOutcome::AlreadyMatched { group: 0, lot: 0 });

        let result = session.finalize();
        assert_eq!(result.matched_count, 1);
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn test_repeated_scans_are_idempotent() {
        for n in 1..=5 {
            let mut once = two_lot_session();
            once.apply_scan("111111111111");
            let mut many = two_lot_session();
            for _ in 0..n {
                many.apply_scan("111111111111");
            }
            assert_eq!(once.groups(), many.groups());
            assert!(many.unmatched().is_empty());
        }
    }

    #[test]
    fn test_unknown_scans_append_every_time_in_order() {
        let mut session = two_lot_session();
        session.apply_scan("AAA");
        session.apply_scan("111111111111");
        session.apply_scan("BBB");
        session.apply_scan("AAA");

        let texts: Vec<&str> = session.unmatched().iter().map(|u| u.scanned_text.as_str()).collect();
        assert_eq!(texts, vec!["AAA", "BBB", "AAA"]);
        let seqs: Vec<u64> = session.unmatched().iter().map(|u| u.sequence).collect();
        assert_eq!(seqs, vec![0, 2, 3]);
    }

    #[test]
    fn test_matched_plus_pending_is_conserved() {
        let mut session = two_lot_session();
        for scan in ["x", "222222222222", "222222222222", "111111111111", "y"] {
            session.apply_scan(scan);
            let snapshot = summarize(&session);
            assert_eq!(snapshot.matched_count + snapshot.pending_count, 2);
        }
        assert_eq!(session.scans_applied(), 5);
    }

    #[test]
    fn test_scan_is_exact_match() {
        let mut session = scenario_session();
        let outcome = session.apply_scan(" 123456789012345");
        assert!(matches!(outcome, ScanOutcome::Unmatched { .. }));
    }

    #[test]
    fn test_duplicate_identifier_matches_first_lot_only() {
        let groups = manifest::parse(
            "00063 - KRAFT KG 10,0 40 45 5,0 888888888888 40 45 5,0 888888888888",
        )
        .unwrap();
        let mut session = Session::start(groups);
        session.apply_scan("888888888888");
        session.apply_scan("888888888888");

        let result = session.finalize();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.pending_count, 1);
        assert_eq!(result.unmatched_count, 0);
    }
}
