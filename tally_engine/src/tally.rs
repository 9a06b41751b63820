//! Scheme tally engines and the shared ranking step.

mod approval;
mod quadratic;
mod ranked;
mod simple;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::ballot::*;
use crate::config::{EngineConfig, Scheme};

pub(crate) use quadratic::credits_by_voter;

// ******** Output data structures *********

/// One line of a leaderboard.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub submission_id: SubmissionId,
    pub title: String,
    pub author: String,
    pub score: f64,
    /// 1 for the first line. Ranks are unique: ties are broken, never shared.
    pub rank: u32,
    /// Number of ballots that contributed to the score.
    pub vote_count: u64,
    /// Quadratic only: credits spent on this submission.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_credits: Option<f64>,
    /// Approval only: weighted approvals over distinct voters, in percent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub approval_percentage: Option<f64>,
}

// Per-submission accumulator shared by the engines.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct SubmissionTally {
    pub(crate) score: f64,
    pub(crate) vote_count: u64,
    // Earliest contributing ballot, for tie breaking.
    pub(crate) earliest: DateTime<Utc>,
    pub(crate) total_credits: Option<f64>,
    pub(crate) approval_percentage: Option<f64>,
}

impl SubmissionTally {
    pub(crate) fn new(first_seen: DateTime<Utc>) -> SubmissionTally {
        SubmissionTally {
            score: 0.0,
            vote_count: 0,
            earliest: first_seen,
            total_credits: None,
            approval_percentage: None,
        }
    }

    pub(crate) fn record(&mut self, ballot: &Ballot) {
        self.vote_count += 1;
        if ballot.cast_at < self.earliest {
            self.earliest = ballot.cast_at;
        }
    }
}

pub(crate) type Tallies = HashMap<SubmissionId, SubmissionTally>;

/// The ballots of the given scheme that are valid and not superseded.
pub(crate) fn contributing(ballots: &[Ballot], scheme: Scheme) -> impl Iterator<Item = &Ballot> {
    ballots
        .iter()
        .filter(move |b| b.scheme == scheme && b.counts())
}

/// Runs the engine of the scheme and ranks the submissions.
///
/// Only submissions that received at least one contributing ballot appear in
/// the output. An empty or all-invalid ballot set yields an empty list.
pub(crate) fn tally(
    ballots: &[Ballot],
    scheme: Scheme,
    candidates: &[Candidate],
    config: &EngineConfig,
) -> Vec<RankedResult> {
    let tallies: Tallies = match scheme {
        Scheme::Simple => simple::tally(ballots),
        Scheme::Quadratic => {
            let excluded: HashSet<VoterKey> = match config.thresholds.per_voter_credit_budget {
                Some(budget) if config.enforce_credit_budget => credits_by_voter(ballots)
                    .into_iter()
                    .filter(|(_, spend)| spend.credits > budget)
                    .map(|(voter, _)| voter)
                    .collect(),
                _ => HashSet::new(),
            };
            if !excluded.is_empty() {
                info!(
                    "tally: excluding {} voters above the credit budget",
                    excluded.len()
                );
            }
            quadratic::tally(ballots, &excluded)
        }
        Scheme::Ranked => ranked::tally(ballots),
        Scheme::Approval => approval::tally(ballots),
    };
    debug!("tally: {} submissions received votes", tallies.len());
    rank_tallies(tallies, candidates)
}

// Score descending, then earliest contributing ballot, then submission id.
fn rank_tallies(tallies: Tallies, candidates: &[Candidate]) -> Vec<RankedResult> {
    let mut entries: Vec<(SubmissionId, SubmissionTally)> = tallies.into_iter().collect();
    entries.sort_by(|(sid_a, a), (sid_b, b)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.earliest.cmp(&b.earliest))
            .then_with(|| sid_a.cmp(sid_b))
    });

    let by_id: HashMap<&str, &Candidate> =
        candidates.iter().map(|c| (c.id.as_str(), c)).collect();

    entries
        .into_iter()
        .enumerate()
        .map(|(idx, (sid, t))| {
            let (title, author) = match by_id.get(sid.as_str()) {
                Some(c) => (c.title.clone(), c.author.clone()),
                None => (sid.clone(), String::new()),
            };
            RankedResult {
                submission_id: sid,
                title,
                author,
                score: t.score,
                rank: (idx + 1) as u32,
                vote_count: t.vote_count,
                total_credits: t.total_credits,
                approval_percentage: t.approval_percentage,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_util {
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    use crate::ballot::*;
    use crate::config::Scheme;
    use crate::normalize::normalize;

    pub(crate) fn raw(voter: &str, target: Option<&str>, payload: RawPayload, sec: i64) -> RawBallot {
        RawBallot {
            id: format!("{}-{}-{}", voter, target.unwrap_or("*"), sec),
            submission_id: target.map(|s| s.to_string()),
            voter: VoterKey::User(voter.to_string()),
            payload,
            weight: None,
            ip_address: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
            cast_at: Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap(),
        }
    }

    pub(crate) fn rated(voter: &str, target: &str, value: f64, sec: i64) -> RawBallot {
        raw(voter, Some(target), RawPayload::Rated { value }, sec)
    }

    pub(crate) fn quadratic(voter: &str, target: &str, votes: f64, credits: f64, sec: i64) -> RawBallot {
        raw(
            voter,
            Some(target),
            RawPayload::Quadratic {
                vote_count: votes,
                credits_spent: credits,
            },
            sec,
        )
    }

    pub(crate) fn ordered(voter: &str, ranking: &[&str], sec: i64) -> RawBallot {
        raw(
            voter,
            None,
            RawPayload::Ordered {
                ranking: ranking.iter().map(|s| s.to_string()).collect(),
            },
            sec,
        )
    }

    pub(crate) fn approval(voter: &str, approved: &[&str], sec: i64) -> RawBallot {
        raw(
            voter,
            None,
            RawPayload::Approval {
                approved_submission_ids: approved.iter().map(|s| s.to_string()).collect(),
            },
            sec,
        )
    }

    pub(crate) fn normalized(raws: &[RawBallot], scheme: Scheme, cands: &[&str]) -> Vec<Ballot> {
        let cs: HashSet<SubmissionId> = cands.iter().map(|s| s.to_string()).collect();
        normalize(raws, scheme, &cs)
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    fn scores(results: &[RankedResult]) -> Vec<(&str, f64, u32)> {
        results
            .iter()
            .map(|r| (r.submission_id.as_str(), r.score, r.rank))
            .collect()
    }

    #[test]
    fn empty_input_gives_empty_results() {
        for scheme in Scheme::ALL {
            assert_eq!(tally(&[], scheme, &[], &EngineConfig::DEFAULT), vec![]);
        }
    }

    #[test]
    fn all_invalid_gives_empty_results() {
        let bs = normalized(
            &[rated("a", "X", 0.0, 0), rated("b", "X", 12.0, 0)],
            Scheme::Simple,
            &["X"],
        );
        assert!(tally(&bs, Scheme::Simple, &[], &EngineConfig::DEFAULT).is_empty());
    }

    #[test]
    fn ties_go_to_the_earliest_ballot() {
        let bs = normalized(
            &[
                rated("a", "B", 7.0, 20),
                rated("b", "A", 7.0, 30),
                rated("c", "C", 7.0, 10),
            ],
            Scheme::Simple,
            &["A", "B", "C"],
        );
        let res = tally(&bs, Scheme::Simple, &[], &EngineConfig::DEFAULT);
        assert_eq!(
            scores(&res),
            vec![("C", 7.0, 1), ("B", 7.0, 2), ("A", 7.0, 3)]
        );
    }

    #[test]
    fn candidate_metadata_is_copied() {
        let bs = normalized(&[rated("a", "A", 5.0, 0)], Scheme::Simple, &["A"]);
        let cands = vec![Candidate {
            id: "A".to_string(),
            title: "Solar kiln".to_string(),
            author: "Team Ember".to_string(),
        }];
        let res = tally(&bs, Scheme::Simple, &cands, &EngineConfig::DEFAULT);
        assert_eq!(res[0].title, "Solar kiln");
        assert_eq!(res[0].author, "Team Ember");
    }

    #[test]
    fn tally_is_repeatable() {
        let bs = normalized(
            &[
                approval("a", &["A", "B"], 0),
                approval("b", &["B", "C"], 1),
                approval("c", &["C", "A"], 2),
            ],
            Scheme::Approval,
            &["A", "B", "C"],
        );
        let first = tally(&bs, Scheme::Approval, &[], &EngineConfig::DEFAULT);
        let second = tally(&bs, Scheme::Approval, &[], &EngineConfig::DEFAULT);
        assert_eq!(first, second);
        assert_eq!(
            scores(&first),
            vec![("A", 2.0, 1), ("B", 2.0, 2), ("C", 2.0, 3)]
        );
    }

    #[test]
    fn budget_enforcement_drops_overspending_voters() {
        let bs = normalized(
            &[
                quadratic("a", "X", 3.0, 9.0, 0),
                quadratic("a", "Y", 2.0, 4.0, 1),
                quadratic("b", "Y", 1.0, 1.0, 2),
            ],
            Scheme::Quadratic,
            &["X", "Y"],
        );
        let mut config = EngineConfig::DEFAULT;
        config.thresholds.per_voter_credit_budget = Some(10.0);
        let lenient = tally(&bs, Scheme::Quadratic, &[], &config);
        assert_eq!(scores(&lenient), vec![("X", 3.0, 1), ("Y", 3.0, 2)]);

        config.enforce_credit_budget = true;
        let strict = tally(&bs, Scheme::Quadratic, &[], &config);
        assert_eq!(scores(&strict), vec![("Y", 1.0, 1)]);
    }
}
