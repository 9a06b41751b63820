//! Ballot normalization: validity marking, then last-write-wins supersession.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::ballot::*;
use crate::config::Scheme;

/// Validates raw ballots against the competition's scheme and candidate set,
/// and converts them to their canonical shape.
///
/// Every input ballot produces exactly one output ballot, in input order.
/// A ballot that breaks a rule is kept with `reason` set. Afterwards, for
/// simple, quadratic and approval ballots, only the most recent ballot of a
/// voter for a given target stays active, whether it is valid or not: a
/// later invalid ballot withdraws an earlier valid one. Ranked ballots are
/// not superseded.
pub fn normalize(
    raw_ballots: &[RawBallot],
    scheme: Scheme,
    candidates: &HashSet<SubmissionId>,
) -> Vec<Ballot> {
    info!(
        "normalize: {} raw ballots, scheme: {}, {} candidates",
        raw_ballots.len(),
        scheme,
        candidates.len()
    );
    let mut ballots: Vec<Ballot> = raw_ballots
        .iter()
        .map(|rb| check_ballot(rb, scheme, candidates))
        .collect();
    supersede(&mut ballots);

    let invalid = ballots.iter().filter(|b| !b.is_valid()).count();
    let inactive = ballots.iter().filter(|b| !b.active).count();
    if invalid > 0 {
        warn!(
            "normalize: {:.1}% of ballots were invalid ({} of {})",
            invalid as f64 / ballots.len() as f64 * 100.0,
            invalid,
            ballots.len()
        );
    }
    debug!("normalize: {} ballots superseded", inactive);
    ballots
}

fn check_ballot(rb: &RawBallot, scheme: Scheme, candidates: &HashSet<SubmissionId>) -> Ballot {
    let weight = rb.weight.unwrap_or(1.0);
    let payload = Payload::from(&rb.payload);
    let reason = check_shape(&rb.payload, scheme)
        .or_else(|| check_numbers(&rb.payload))
        .or_else(|| check_weight(weight))
        .or_else(|| check_references(&payload, rb.submission_id.as_ref(), candidates));
    if let Some(r) = reason {
        debug!("check_ballot: ballot {:?} is invalid: {}", rb.id, r);
    }
    Ballot {
        id: rb.id.clone(),
        submission_id: rb.submission_id.clone(),
        voter: rb.voter.clone(),
        scheme,
        payload,
        weight,
        ip_address: rb.ip_address.clone(),
        user_agent: rb.user_agent.clone(),
        cast_at: rb.cast_at,
        reason,
        active: true,
    }
}

fn check_shape(raw: &RawPayload, scheme: Scheme) -> Option<ReasonCode> {
    if raw.scheme() == Some(scheme) {
        None
    } else {
        Some(ReasonCode::SchemeMismatch)
    }
}

/// Vote counts and ranks above 2^53 are not exact integers in a float.
const MAX_COUNT: f64 = 9_007_199_254_740_992.0;

fn is_count(x: f64) -> bool {
    x.is_finite() && (0.0..=MAX_COUNT).contains(&x) && x.fract() == 0.0
}

// Ranges, integrality and the quadratic credit invariant, on the raw numbers.
fn check_numbers(raw: &RawPayload) -> Option<ReasonCode> {
    match raw {
        RawPayload::Rated { value } => {
            if value.is_finite() && (1.0..=10.0).contains(value) {
                None
            } else {
                Some(ReasonCode::OutOfRange)
            }
        }
        RawPayload::Quadratic {
            vote_count,
            credits_spent,
        } => {
            if !is_count(*vote_count) || !credits_spent.is_finite() || *credits_spent < 0.0 {
                Some(ReasonCode::OutOfRange)
            } else if *credits_spent != vote_count * vote_count {
                // Never corrected: the voter's client and the log disagree.
                Some(ReasonCode::CreditMismatch)
            } else {
                None
            }
        }
        RawPayload::Ranked { rankings } => {
            if rankings.is_empty() {
                Some(ReasonCode::EmptySelection)
            } else if rankings.iter().any(|r| !is_count(r.rank) || r.rank < 1.0) {
                Some(ReasonCode::OutOfRange)
            } else {
                None
            }
        }
        RawPayload::Ordered { ranking } if ranking.is_empty() => Some(ReasonCode::EmptySelection),
        RawPayload::Ordered { .. } => None,
        RawPayload::Approval {
            approved_submission_ids,
        } if approved_submission_ids.is_empty() => Some(ReasonCode::EmptySelection),
        RawPayload::Approval { .. } => None,
        RawPayload::Unrecognized(_) => None,
    }
}

fn check_weight(weight: f64) -> Option<ReasonCode> {
    if weight.is_finite() && weight >= 0.0 {
        None
    } else {
        Some(ReasonCode::OutOfRange)
    }
}

fn check_references(
    payload: &Payload,
    target: Option<&SubmissionId>,
    candidates: &HashSet<SubmissionId>,
) -> Option<ReasonCode> {
    match payload {
        Payload::Simple { .. } | Payload::Quadratic { .. } => match target {
            None => Some(ReasonCode::MissingSubmission),
            Some(sid) if !candidates.contains(sid) => Some(ReasonCode::UnknownSubmission),
            Some(_) => None,
        },
        Payload::Ranked { rankings } => {
            let mut seen_ranks: HashSet<i64> = HashSet::new();
            let mut seen_sids: HashSet<&SubmissionId> = HashSet::new();
            for r in rankings.iter() {
                if !seen_ranks.insert(r.rank) || !seen_sids.insert(&r.submission_id) {
                    return Some(ReasonCode::DuplicateRank);
                }
            }
            if rankings
                .iter()
                .any(|r| !candidates.contains(&r.submission_id))
            {
                Some(ReasonCode::UnknownSubmission)
            } else {
                None
            }
        }
        Payload::Approval {
            approved_submission_ids,
        } => {
            if approved_submission_ids
                .iter()
                .any(|sid| !candidates.contains(sid))
            {
                Some(ReasonCode::UnknownSubmission)
            } else {
                None
            }
        }
        Payload::Unrecognized { .. } => None,
    }
}

// Last write wins per (voter, target). Equal timestamps: the later entry of
// the log wins.
fn supersede(ballots: &mut [Ballot]) {
    let mut latest: HashMap<(&VoterKey, Option<&SubmissionId>), usize> = HashMap::new();
    for (idx, b) in ballots.iter().enumerate() {
        if b.scheme == Scheme::Ranked {
            continue;
        }
        let key = (&b.voter, b.submission_id.as_ref());
        match latest.get(&key) {
            Some(&prev) if ballots[prev].cast_at > b.cast_at => {}
            _ => {
                latest.insert(key, idx);
            }
        }
    }
    let winners: HashSet<usize> = latest.values().cloned().collect();
    for (idx, b) in ballots.iter_mut().enumerate() {
        b.active = b.scheme == Scheme::Ranked || winners.contains(&idx);
    }
}
