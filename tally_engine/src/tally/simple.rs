// Simple rating: weighted mean of the values cast for a submission.

use std::collections::HashMap;

use crate::ballot::*;
use crate::config::Scheme;
use crate::tally::{contributing, SubmissionTally, Tallies};

pub(crate) fn tally(ballots: &[Ballot]) -> Tallies {
    // (accumulator, sum of weights)
    let mut acc: HashMap<SubmissionId, (SubmissionTally, f64)> = HashMap::new();
    for b in contributing(ballots, Scheme::Simple) {
        if let (Payload::Simple { value }, Some(sid)) = (&b.payload, &b.submission_id) {
            let e = acc
                .entry(sid.clone())
                .or_insert_with(|| (SubmissionTally::new(b.cast_at), 0.0));
            e.0.score += b.weight * value;
            e.1 += b.weight;
            e.0.record(b);
        }
    }
    acc.into_iter()
        .map(|(sid, (mut t, total_weight))| {
            t.score = if total_weight > 0.0 {
                t.score / total_weight
            } else {
                0.0
            };
            (sid, t)
        })
        .collect()
}
