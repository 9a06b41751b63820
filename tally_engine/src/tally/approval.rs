// Approval voting.

use std::collections::HashSet;

use crate::ballot::*;
use crate::config::Scheme;
use crate::numeric::percentage;
use crate::tally::{contributing, SubmissionTally, Tallies};

pub(crate) fn tally(ballots: &[Ballot]) -> Tallies {
    let mut voters: HashSet<&VoterKey> = HashSet::new();
    let mut res = Tallies::new();
    for b in contributing(ballots, Scheme::Approval) {
        if let Payload::Approval {
            approved_submission_ids,
        } = &b.payload
        {
            voters.insert(&b.voter);
            for sid in approved_submission_ids.iter() {
                let t = res
                    .entry(sid.clone())
                    .or_insert_with(|| SubmissionTally::new(b.cast_at));
                t.score += b.weight;
                t.record(b);
            }
        }
    }
    let num_voters = voters.len() as f64;
    for t in res.values_mut() {
        t.approval_percentage = Some(percentage(t.score, num_voters));
    }
    res
}
