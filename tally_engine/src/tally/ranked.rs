// Borda count.

use std::collections::HashSet;

use crate::ballot::*;
use crate::config::Scheme;
use crate::tally::{contributing, SubmissionTally, Tallies};

/// With N the number of distinct submissions ranked anywhere in the vote
/// set, a rank r earns N - r + 1 points, scaled by the ballot weight.
/// Submissions a ballot does not rank earn nothing from it. Ranks beyond N
/// (possible when a ballot leaves gaps) earn 0.
pub(crate) fn tally(ballots: &[Ballot]) -> Tallies {
    let n = contributing(ballots, Scheme::Ranked)
        .flat_map(|b| b.referenced_submissions())
        .collect::<HashSet<&SubmissionId>>()
        .len() as i64;

    let mut res = Tallies::new();
    for b in contributing(ballots, Scheme::Ranked) {
        if let Payload::Ranked { rankings } = &b.payload {
            for r in rankings.iter() {
                let points = (n - r.rank + 1).max(0) as f64;
                let t = res
                    .entry(r.submission_id.clone())
                    .or_insert_with(|| SubmissionTally::new(b.cast_at));
                t.score += b.weight * points;
                t.record(b);
            }
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::test_util::*;

    #[test]
    fn three_candidates() {
        let bs = normalized(&[ordered("a", &["A", "B", "C"], 0)], Scheme::Ranked, &["A", "B", "C"]);
        let t = tally(&bs);
        assert_eq!(t["A"].score, 3.0);
        assert_eq!(t["B"].score, 2.0);
        assert_eq!(t["C"].score, 1.0);
    }

    #[test]
    fn n_counts_every_ranked_submission() {
        let bs = normalized(
            &[
                ordered("a", &["A", "B"], 0),
                ordered("b", &["C", "D"], 1),
            ],
            Scheme::Ranked,
            &["A", "B", "C", "D"],
        );
        let t = tally(&bs);
        // N = 4: first place earns 4 and second place 3, omitted candidates nothing.
        assert_eq!(t["A"].score, 4.0);
        assert_eq!(t["B"].score, 3.0);
        assert_eq!(t["C"].score, 4.0);
        assert_eq!(t["D"].score, 3.0);
        assert_eq!(t["A"].vote_count, 1);
    }

    #[test]
    fn weights_and_invalid_ballots() {
        let mut raws = vec![
            ordered("judge", &["B", "A"], 0),
            ordered("x", &["A", "Z"], 1),
        ];
        raws[0].weight = Some(1.5);
        let bs = normalized(&raws, Scheme::Ranked, &["A", "B"]);
        let t = tally(&bs);
        assert_eq!(t["B"].score, 3.0);
        assert_eq!(t["A"].score, 1.5);
        assert!(!t.contains_key("Z"));
    }
}
