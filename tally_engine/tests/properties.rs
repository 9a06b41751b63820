use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use tally_engine::*;

fn at(sec: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap()
}

fn sid(i: usize) -> SubmissionId {
    format!("s{}", i)
}

fn candidate_ids(n: usize) -> HashSet<SubmissionId> {
    (0..n).map(sid).collect()
}

fn ballot(idx: usize, voter: usize, target: Option<usize>, payload: RawPayload, sec: i64) -> RawBallot {
    RawBallot {
        id: format!("b{}", idx),
        submission_id: target.map(sid),
        voter: VoterKey::User(format!("v{}", voter)),
        payload,
        weight: None,
        ip_address: UNKNOWN.to_string(),
        user_agent: UNKNOWN.to_string(),
        cast_at: at(sec),
    }
}

const CANDIDATES: usize = 4;

// (voter, target, value, second); values include some out of range ones.
fn arb_ratings() -> impl Strategy<Value = Vec<RawBallot>> {
    prop::collection::vec((0..6usize, 0..CANDIDATES, 0..12u32, 0..600i64), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, (voter, target, value, sec))| {
                ballot(
                    idx,
                    voter,
                    Some(target),
                    RawPayload::Rated {
                        value: value as f64,
                    },
                    sec,
                )
            })
            .collect()
    })
}

// One approval ballot per voter, so that every valid ballot counts.
fn arb_approvals() -> impl Strategy<Value = Vec<RawBallot>> {
    prop::collection::vec(
        (prop::collection::btree_set(0..CANDIDATES, 1..=CANDIDATES), 0..5u32, 0..600i64),
        0..20,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, (approved, weight, sec))| {
                let mut b = ballot(
                    idx,
                    idx,
                    None,
                    RawPayload::Approval {
                        approved_submission_ids: approved.into_iter().map(sid).collect(),
                    },
                    sec,
                );
                b.weight = Some(weight as f64);
                b
            })
            .collect()
    })
}

// (voter, target, votes, second); some ballots break the credit invariant.
fn arb_quadratic() -> impl Strategy<Value = Vec<RawBallot>> {
    prop::collection::vec(
        (0..6usize, 0..CANDIDATES, 0..6u32, any::<bool>(), 0..600i64),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, (voter, target, votes, honest, sec))| {
                let credits = if honest { votes * votes } else { votes * votes + 1 };
                ballot(
                    idx,
                    voter,
                    Some(target),
                    RawPayload::Quadratic {
                        vote_count: votes as f64,
                        credits_spent: credits as f64,
                    },
                    sec,
                )
            })
            .collect()
    })
}

fn results(raws: &[RawBallot], scheme: Scheme) -> Vec<RankedResult> {
    let ballots = normalize(raws, scheme, &candidate_ids(CANDIDATES));
    compute_results(&ballots, scheme, &[], &EngineConfig::DEFAULT).unwrap()
}

// Casting an active ballot again, later and unchanged, keeps every score and
// vote count and makes the new record the active one.
fn resubmission_is_idempotent(
    raws: &[RawBallot],
    scheme: Scheme,
    pick: prop::sample::Index,
) -> Result<(), TestCaseError> {
    let ballots = normalize(raws, scheme, &candidate_ids(CANDIDATES));
    let active: Vec<usize> = (0..ballots.len()).filter(|i| ballots[*i].active).collect();
    prop_assume!(!active.is_empty());
    let original = &raws[active[pick.index(active.len())]];

    let mut again = original.clone();
    again.id = "resubmitted".to_string();
    again.cast_at = at(10_000);
    let mut extended = raws.to_vec();
    extended.push(again);

    let scores = |rs: &[RankedResult]| -> Vec<(SubmissionId, f64, u64)> {
        let mut v: Vec<(SubmissionId, f64, u64)> = rs
            .iter()
            .map(|r| (r.submission_id.clone(), r.score, r.vote_count))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    };
    prop_assert_eq!(
        scores(&results(raws, scheme)),
        scores(&results(&extended, scheme))
    );

    let renormalized = normalize(&extended, scheme, &candidate_ids(CANDIDATES));
    prop_assert!(renormalized.last().map(|b| b.active).unwrap_or(false));
    prop_assert!(!renormalized[active[pick.index(active.len())]].active);
    Ok(())
}

proptest! {
    #[test]
    fn tally_is_deterministic(raws in arb_ratings()) {
        let first = results(&raws, Scheme::Simple);
        let second = results(&raws, Scheme::Simple);
        prop_assert_eq!(&first, &second);
        let ranks: Vec<u32> = first.iter().map(|r| r.rank).collect();
        let expected: Vec<u32> = (1..=first.len() as u32).collect();
        prop_assert_eq!(ranks, expected);
    }

    #[test]
    fn approval_scores_are_conserved(raws in arb_approvals()) {
        let ballots = normalize(&raws, Scheme::Approval, &candidate_ids(CANDIDATES));
        let res = compute_results(&ballots, Scheme::Approval, &[], &EngineConfig::DEFAULT).unwrap();
        let total: f64 = res.iter().map(|r| r.score).sum();
        let expected: f64 = ballots
            .iter()
            .filter(|b| b.counts())
            .map(|b| b.weight * b.referenced_submissions().len() as f64)
            .sum();
        prop_assert_eq!(total, expected);
    }

    #[test]
    fn borda_points_of_a_full_ranking(
        ranking in (1..8usize).prop_flat_map(|n| Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
    ) {
        let n = ranking.len();
        let raw = ballot(
            0,
            0,
            None,
            RawPayload::Ordered { ranking: ranking.iter().cloned().map(sid).collect() },
            0,
        );
        let ballots = normalize(&[raw], Scheme::Ranked, &candidate_ids(n));
        let res = compute_results(&ballots, Scheme::Ranked, &[], &EngineConfig::DEFAULT).unwrap();
        let total: f64 = res.iter().map(|r| r.score).sum();
        prop_assert_eq!(total, (n * (n + 1) / 2) as f64);
        prop_assert_eq!(&res[0].submission_id, &sid(ranking[0]));
    }

    #[test]
    fn resubmitting_the_same_rating_changes_nothing(raws in arb_ratings(), pick in any::<prop::sample::Index>()) {
        resubmission_is_idempotent(&raws, Scheme::Simple, pick)?;
    }

    #[test]
    fn resubmitting_the_same_quadratic_ballot_changes_nothing(
        raws in arb_quadratic(),
        pick in any::<prop::sample::Index>()
    ) {
        resubmission_is_idempotent(&raws, Scheme::Quadratic, pick)?;
    }

    #[test]
    fn resubmitting_the_same_approval_set_changes_nothing(
        raws in arb_approvals(),
        pick in any::<prop::sample::Index>()
    ) {
        resubmission_is_idempotent(&raws, Scheme::Approval, pick)?;
    }

    #[test]
    fn credit_mismatch_is_never_corrected(votes in 0..50u32, credits in 0..2600u32) {
        prop_assume!(credits != votes * votes);
        let raw = ballot(
            0,
            0,
            Some(0),
            RawPayload::Quadratic { vote_count: votes as f64, credits_spent: credits as f64 },
            0,
        );
        let ballots = normalize(&[raw], Scheme::Quadratic, &candidate_ids(1));
        prop_assert_eq!(ballots[0].reason, Some(ReasonCode::CreditMismatch));
        let res = compute_results(&ballots, Scheme::Quadratic, &[], &EngineConfig::DEFAULT).unwrap();
        prop_assert!(res.is_empty());
    }
}

#[test]
fn empty_input_contract() {
    for scheme in Scheme::ALL {
        assert!(compute_results(&[], scheme, &[], &EngineConfig::DEFAULT)
            .unwrap()
            .is_empty());
    }
    let stats = compute_statistics(&[], None, &Default::default(), &EngineConfig::DEFAULT).unwrap();
    let overview = stats.overview.unwrap();
    assert_eq!(overview.total_ballots, 0);
    assert_eq!(overview.valid_ballots, 0);
    assert_eq!(overview.distinct_voters, 0);
    assert!(compute_anomalies(&[], None).unwrap().is_empty());
}
