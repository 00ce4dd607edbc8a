//! Vote ledger and tally snapshots.

use super::round::VotingRound;
use crate::errors::VcError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Immutable option -> count mapping captured at an instant.
///
/// Cheap to clone; entries keep the configured option order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    counts: Arc<[(String, u64)]>,
}

impl TallySnapshot {
    /// Count for `option`, or `None` if it is not a configured option.
    #[must_use]
    pub fn count(&self, option: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|(name, _)| name == option)
            .map(|(_, count)| *count)
    }

    /// Total number of accepted votes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, count)| count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
    }
}

/// Renders as `{A:2, B:1, C:0}`.
impl fmt::Display for TallySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, count)) in self.counts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}:{count}")?;
        }
        f.write_str("}")
    }
}

/// Identity -> chosen option, plus the aggregated tally.
#[derive(Debug)]
pub struct VoteLedger {
    tally: Vec<(String, u64)>,
    records: HashMap<String, String>,
}

impl VoteLedger {
    /// Create an empty ledger over `options` (order is preserved).
    #[must_use]
    pub fn new(options: Vec<String>) -> Self {
        Self {
            tally: options.into_iter().map(|option| (option, 0)).collect(),
            records: HashMap::new(),
        }
    }

    /// Configured options in display order.
    #[must_use]
    pub fn options(&self) -> Vec<String> {
        self.tally.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Record a vote for `client_id`.
    ///
    /// Checks run in order and the first failure wins: round acceptance,
    /// duplicate vote, option validity. On success the record is stored, the
    /// tally incremented and an immutable copy returned.
    ///
    /// # Errors
    ///
    /// `RoundNotActive`, `RoundExpired`, `DuplicateVote` or `InvalidOption`.
    pub fn record_vote(
        &mut self,
        round: &VotingRound,
        client_id: &str,
        option: &str,
        now: Instant,
    ) -> Result<TallySnapshot, VcError> {
        round.ensure_accepting(now)?;

        if self.records.contains_key(client_id) {
            return Err(VcError::DuplicateVote);
        }

        if !self.tally.iter().any(|(name, _)| name == option) {
            return Err(VcError::InvalidOption {
                option: option.to_string(),
                valid: self.options(),
            });
        }
        for (_, count) in self.tally.iter_mut().filter(|(name, _)| name == option) {
            *count += 1;
        }

        self.records
            .insert(client_id.to_string(), option.to_string());
        Ok(self.snapshot())
    }

    /// Whether `client_id` has a recorded vote (eligible for updates).
    #[must_use]
    pub fn has_voted(&self, client_id: &str) -> bool {
        self.records.contains_key(client_id)
    }

    /// The option `client_id` voted for, if any.
    #[must_use]
    pub fn vote_of(&self, client_id: &str) -> Option<&str> {
        self.records.get(client_id).map(String::as_str)
    }

    #[must_use]
    pub fn voter_count(&self) -> usize {
        self.records.len()
    }

    /// Immutable copy of the current tally.
    #[must_use]
    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            counts: self.tally.clone().into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::voting::RoundPhase;
    use std::time::Duration;

    fn abc_ledger() -> VoteLedger {
        VoteLedger::new(vec!["A".to_string(), "B".to_string(), "C".to_string()])
    }

    fn active_round(now: Instant) -> VotingRound {
        let mut round = VotingRound::new();
        round.start(Duration::from_secs(60), now).unwrap();
        round
    }

    #[test]
    fn test_scenario_tally() {
        let now = Instant::now();
        let round = active_round(now);
        let mut ledger = abc_ledger();

        ledger.record_vote(&round, "x1", "A", now).unwrap();
        ledger.record_vote(&round, "x2", "A", now).unwrap();
        let tally = ledger.record_vote(&round, "x3", "B", now).unwrap();

        assert_eq!(tally.count("A"), Some(2));
        assert_eq!(tally.count("B"), Some(1));
        assert_eq!(tally.count("C"), Some(0));
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.to_string(), "{A:2, B:1, C:0}");
    }

    #[test]
    fn test_duplicate_vote_leaves_tally_unchanged() {
        let now = Instant::now();
        let round = active_round(now);
        let mut ledger = abc_ledger();

        ledger.record_vote(&round, "x1", "A", now).unwrap();
        let before = ledger.snapshot();

        assert_eq!(
            ledger.record_vote(&round, "x1", "B", now),
            Err(VcError::DuplicateVote)
        );
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.vote_of("x1"), Some("A"));
    }

    #[test]
    fn test_invalid_option_rejected() {
        let now = Instant::now();
        let round = active_round(now);
        let mut ledger = abc_ledger();

        let err = ledger.record_vote(&round, "x1", "D", now).unwrap_err();
        assert_eq!(
            err,
            VcError::InvalidOption {
                option: "D".to_string(),
                valid: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            }
        );
        assert_eq!(ledger.snapshot().total(), 0);
        assert!(!ledger.has_voted("x1"));
    }

    #[test]
    fn test_option_match_is_exact() {
        let now = Instant::now();
        let round = active_round(now);
        let mut ledger = abc_ledger();

        assert!(matches!(
            ledger.record_vote(&round, "x1", "a", now),
            Err(VcError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_round_checks_come_first() {
        let now = Instant::now();
        let mut ledger = abc_ledger();

        // Not started beats invalid option.
        let round = VotingRound::new();
        assert_eq!(
            ledger.record_vote(&round, "x1", "D", now),
            Err(VcError::RoundNotActive(RoundPhase::NotStarted))
        );

        // Expired beats duplicate vote.
        let round = active_round(now);
        ledger.record_vote(&round, "x1", "A", now).unwrap();
        assert_eq!(
            ledger.record_vote(&round, "x1", "A", now + Duration::from_secs(61)),
            Err(VcError::RoundExpired)
        );

        // Duplicate beats invalid option.
        assert_eq!(
            ledger.record_vote(&round, "x1", "D", now),
            Err(VcError::DuplicateVote)
        );
    }

    #[test]
    fn test_snapshot_is_immutable_copy() {
        let now = Instant::now();
        let round = active_round(now);
        let mut ledger = abc_ledger();

        let first = ledger.record_vote(&round, "x1", "C", now).unwrap();
        ledger.record_vote(&round, "x2", "C", now).unwrap();

        assert_eq!(first.count("C"), Some(1));
        assert_eq!(ledger.snapshot().count("C"), Some(2));
        assert_eq!(ledger.voter_count(), 2);
    }

    #[test]
    fn test_iter_preserves_option_order() {
        let ledger = VoteLedger::new(vec!["Z".to_string(), "A".to_string()]);
        let snapshot = ledger.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Z", "A"]);
    }
}
