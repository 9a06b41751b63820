// Quadratic voting. The score is the weighted sum of votes; credits are the
// cost of casting them and are only reported.

use std::collections::{BTreeMap, HashSet};

use crate::ballot::*;
use crate::config::Scheme;
use crate::tally::{contributing, SubmissionTally, Tallies};

/// Credits spent by one voter over the whole competition.
#[derive(PartialEq, Debug, Clone, Default)]
pub(crate) struct CreditSpend {
    pub(crate) credits: f64,
    pub(crate) ballot_ids: Vec<String>,
}

/// Cumulative spend per voter, over the contributing quadratic ballots.
pub(crate) fn credits_by_voter(ballots: &[Ballot]) -> BTreeMap<VoterKey, CreditSpend> {
    let mut res: BTreeMap<VoterKey, CreditSpend> = BTreeMap::new();
    for b in contributing(ballots, Scheme::Quadratic) {
        if let Payload::Quadratic { credits_spent, .. } = b.payload {
            let e = res.entry(b.voter.clone()).or_default();
            e.credits += credits_spent;
            e.ballot_ids.push(b.id.clone());
        }
    }
    res
}

pub(crate) fn tally(ballots: &[Ballot], excluded: &HashSet<VoterKey>) -> Tallies {
    let mut res = Tallies::new();
    for b in contributing(ballots, Scheme::Quadratic).filter(|b| !excluded.contains(&b.voter)) {
        if let (
            Payload::Quadratic {
                vote_count,
                credits_spent,
            },
            Some(sid),
        ) = (&b.payload, &b.submission_id)
        {
            let t = res
                .entry(sid.clone())
                .or_insert_with(|| SubmissionTally::new(b.cast_at));
            t.score += b.weight * (*vote_count as f64);
            *t.total_credits.get_or_insert(0.0) += credits_spent;
            t.record(b);
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::test_util::*;

    #[test]
    fn score_is_the_vote_sum() {
        let bs = normalized(
            &[
                quadratic("a", "X", 3.0, 9.0, 0),
                quadratic("b", "X", 2.0, 5.0, 1),
                quadratic("c", "X", 1.0, 1.0, 2),
            ],
            Scheme::Quadratic,
            &["X"],
        );
        let t = tally(&bs, &HashSet::new());
        // The second ballot breaks the credit invariant and contributes 0.
        assert_eq!(t["X"].score, 4.0);
        assert_eq!(t["X"].vote_count, 2);
        assert_eq!(t["X"].total_credits, Some(10.0));
    }

    #[test]
    fn spend_is_cumulative_per_voter() {
        let bs = normalized(
            &[
                quadratic("a", "X", 3.0, 9.0, 0),
                quadratic("a", "Y", 2.0, 4.0, 1),
                // Replaces the previous ballot on Y.
                quadratic("a", "Y", 1.0, 1.0, 2),
                quadratic("b", "Y", 4.0, 16.0, 3),
            ],
            Scheme::Quadratic,
            &["X", "Y"],
        );
        let spend = credits_by_voter(&bs);
        assert_eq!(spend[&VoterKey::User("a".to_string())].credits, 10.0);
        assert_eq!(spend[&VoterKey::User("b".to_string())].credits, 16.0);
    }

    #[test]
    fn identical_resubmission_changes_nothing() {
        let first = vec![
            quadratic("a", "X", 3.0, 9.0, 0),
            quadratic("b", "X", 2.0, 4.0, 1),
        ];
        let mut again = first.clone();
        again.push(quadratic("a", "X", 3.0, 9.0, 60));

        let before = tally(&normalized(&first, Scheme::Quadratic, &["X"]), &HashSet::new());
        let bs = normalized(&again, Scheme::Quadratic, &["X"]);
        let after = tally(&bs, &HashSet::new());
        assert_eq!(after["X"].score, before["X"].score);
        assert_eq!(after["X"].vote_count, before["X"].vote_count);
        assert_eq!(after["X"].total_credits, Some(13.0));
        assert!(!bs[0].active);
        assert!(bs[2].counts());
    }

    #[test]
    fn zero_votes_are_valid() {
        let bs = normalized(&[quadratic("a", "X", 0.0, 0.0, 0)], Scheme::Quadratic, &["X"]);
        let t = tally(&bs, &HashSet::new());
        assert_eq!(t["X"].score, 0.0);
        assert_eq!(t["X"].vote_count, 1);
    }
}
