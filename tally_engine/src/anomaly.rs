//! Integrity heuristics over a ballot set.
//!
//! Detection is advisory: it reads the normalized ballots and produces a side
//! report. It never changes the validity of a ballot nor its participation in
//! a tally.
//!
//! Only valid ballots are examined. The credit budget check additionally
//! ignores superseded ballots, since it measures what a voter actually spends.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::ballot::*;
use crate::config::AnomalyThresholds;
use crate::numeric::quantile;
use crate::tally::credits_by_voter;

/// Per-address ballot counts above this quantile are reported.
const IP_VOLUME_QUANTILE: f64 = 0.95;

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    VelocitySpike,
    CreditBudget,
    IpClustering,
    DuplicatePattern,
    IpVolumeOutlier,
    RapidVote,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected to produce false positives.
    Advisory,
    Medium,
    High,
}

/// Who or what a report is about.
#[derive(Eq, PartialEq, Debug, Clone, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnomalySubject {
    Voter(VoterKey),
    IpAddress(String),
    IpPrefix(String),
    /// Several voters acting together.
    Voters(Vec<VoterKey>),
    Submission(SubmissionId),
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub description: String,
    /// The ballots behind the report, in chronological order.
    pub ballot_ids: Vec<String>,
    /// The measured quantity (ballots, voters or credits).
    pub observed: f64,
    /// The threshold it was compared against.
    pub limit: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub window_end: Option<DateTime<Utc>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub subject: AnomalySubject,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub submission_id: Option<SubmissionId>,
    pub severity: Severity,
    pub evidence: Evidence,
}

// ******** Detection *********

/// Runs the enabled heuristics. The thresholds must have been validated.
pub(crate) fn detect(ballots: &[Ballot], thresholds: &AnomalyThresholds) -> Vec<AnomalyReport> {
    let valid: Vec<&Ballot> = ballots.iter().filter(|b| b.is_valid()).collect();
    info!(
        "detect: {} ballots, {} valid, detectors: {:?}",
        ballots.len(),
        valid.len(),
        thresholds.detectors
    );

    let detectors = &thresholds.detectors;
    let mut res: Vec<AnomalyReport> = Vec::new();
    if detectors.velocity_spike {
        res.extend(velocity_spikes(&valid, thresholds));
    }
    if detectors.credit_budget {
        res.extend(credit_budget(ballots, thresholds));
    }
    if detectors.ip_clustering {
        res.extend(ip_clusters(&valid, thresholds));
    }
    if detectors.duplicate_pattern {
        res.extend(duplicate_patterns(&valid, thresholds));
    }
    if detectors.ip_volume_outlier {
        res.extend(ip_volume_outliers(&valid));
    }
    if detectors.rapid_vote {
        res.extend(rapid_votes(&valid, thresholds));
    }

    res.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.submission_id.cmp(&b.submission_id))
    });
    info!("detect: {} anomalies", res.len());
    res
}

// Groups the ballots by key, each group in chronological order. Ballots
// without a key are skipped.
fn chronological_groups<'a, K: Ord>(
    ballots: &[&'a Ballot],
    key: impl Fn(&'a Ballot) -> Option<K>,
) -> BTreeMap<K, Vec<&'a Ballot>> {
    let mut res: BTreeMap<K, Vec<&'a Ballot>> = BTreeMap::new();
    for b in ballots.iter().cloned() {
        if let Some(k) = key(b) {
            res.entry(k).or_default().push(b);
        }
    }
    for group in res.values_mut() {
        group.sort_by(|x, y| x.cast_at.cmp(&y.cast_at).then_with(|| x.id.cmp(&y.id)));
    }
    res
}

/// How a window is measured.
#[derive(Clone, Copy)]
enum Measure {
    Ballots,
    DistinctVoters,
}

struct Window<'a> {
    size: usize,
    ballots: Vec<&'a Ballot>,
}

impl<'a> Window<'a> {
    fn ballot_ids(&self) -> Vec<String> {
        self.ballots.iter().map(|b| b.id.clone()).collect()
    }

    fn voters(&self) -> Vec<VoterKey> {
        let vs: BTreeSet<&VoterKey> = self.ballots.iter().map(|b| &b.voter).collect();
        vs.into_iter().cloned().collect()
    }

    fn evidence(&self, description: String, limit: u32) -> Evidence {
        Evidence {
            description,
            ballot_ids: self.ballot_ids(),
            observed: self.size as f64,
            limit: limit as f64,
            window_start: self.ballots.first().map(|b| b.cast_at),
            window_end: self.ballots.last().map(|b| b.cast_at),
        }
    }
}

// The first densest window of a chronologically sorted group. A window holds
// the ballots cast at most `window_seconds` after its first ballot.
fn densest_window<'a>(sorted: &[&'a Ballot], window_seconds: i64, measure: Measure) -> Window<'a> {
    let window_ms = window_seconds.saturating_mul(1000);
    let mut per_voter: HashMap<&'a VoterKey, usize> = HashMap::new();
    let (mut best, mut best_start, mut best_end) = (0, 0, 0);
    let mut start = 0;
    for (end, b) in sorted.iter().cloned().enumerate() {
        *per_voter.entry(&b.voter).or_insert(0) += 1;
        while (b.cast_at - sorted[start].cast_at).num_milliseconds() > window_ms {
            let leaving: &'a Ballot = sorted[start];
            if let Some(c) = per_voter.get_mut(&leaving.voter) {
                *c -= 1;
                if *c == 0 {
                    per_voter.remove(&leaving.voter);
                }
            }
            start += 1;
        }
        let size = match measure {
            Measure::Ballots => end + 1 - start,
            Measure::DistinctVoters => per_voter.len(),
        };
        if size > best {
            best = size;
            best_start = start;
            best_end = end + 1;
        }
    }
    Window {
        size: best,
        ballots: sorted[best_start..best_end].to_vec(),
    }
}

fn escalated(observed: usize, threshold: u32) -> Severity {
    if observed as u64 >= 2 * threshold as u64 {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn velocity_spikes(valid: &[&Ballot], thresholds: &AnomalyThresholds) -> Vec<AnomalyReport> {
    let limit = thresholds.velocity_spike_threshold;
    let mut res = Vec::new();
    for (voter, group) in chronological_groups(valid, |b| Some(b.voter.clone())) {
        let w = densest_window(&group, thresholds.velocity_window_seconds, Measure::Ballots);
        if w.size > limit as usize {
            debug!("velocity_spikes: {} cast {} ballots", voter, w.size);
            res.push(AnomalyReport {
                kind: AnomalyKind::VelocitySpike,
                severity: escalated(w.size, limit),
                evidence: w.evidence(
                    format!(
                        "{} valid ballots within {} seconds",
                        w.size, thresholds.velocity_window_seconds
                    ),
                    limit,
                ),
                subject: AnomalySubject::Voter(voter),
                submission_id: None,
            });
        }
    }
    res
}

fn credit_budget(ballots: &[Ballot], thresholds: &AnomalyThresholds) -> Vec<AnomalyReport> {
    let budget = match thresholds.per_voter_credit_budget {
        Some(b) => b,
        None => return vec![],
    };
    credits_by_voter(ballots)
        .into_iter()
        .filter(|(_, spend)| spend.credits > budget)
        .map(|(voter, spend)| AnomalyReport {
            kind: AnomalyKind::CreditBudget,
            subject: AnomalySubject::Voter(voter),
            submission_id: None,
            severity: Severity::High,
            evidence: Evidence {
                description: format!(
                    "{} credits spent over a budget of {}",
                    spend.credits, budget
                ),
                ballot_ids: spend.ballot_ids,
                observed: spend.credits,
                limit: budget,
                window_start: None,
                window_end: None,
            },
        })
        .collect()
}

// One report per prefix, not one per voter.
fn ip_clusters(valid: &[&Ballot], thresholds: &AnomalyThresholds) -> Vec<AnomalyReport> {
    let limit = thresholds.ip_cluster_threshold;
    let octets = thresholds.ip_cluster_prefix_octets;
    let mut res = Vec::new();
    for (prefix, group) in chronological_groups(valid, |b| ip_prefix(&b.ip_address, octets)) {
        let w = densest_window(
            &group,
            thresholds.ip_cluster_window_seconds,
            Measure::DistinctVoters,
        );
        if w.size > limit as usize {
            debug!("ip_clusters: {} voters behind {}", w.size, prefix);
            res.push(AnomalyReport {
                kind: AnomalyKind::IpClustering,
                severity: escalated(w.size, limit),
                evidence: w.evidence(
                    format!(
                        "{} distinct voters from {} within {} seconds",
                        w.size, prefix, thresholds.ip_cluster_window_seconds
                    ),
                    limit,
                ),
                subject: AnomalySubject::IpPrefix(prefix),
                submission_id: None,
            });
        }
    }
    res
}

// A comparable rendering of what the ballot expresses, independent of the
// voter and of the time.
fn payload_signature(payload: &Payload) -> String {
    match payload {
        Payload::Simple { value } => format!("value:{}", value),
        Payload::Quadratic { vote_count, .. } => format!("votes:{}", vote_count),
        Payload::Ranked { rankings } => {
            let mut rs: Vec<&Ranking> = rankings.iter().collect();
            rs.sort_by_key(|r| r.rank);
            let ids: Vec<&str> = rs.iter().map(|r| r.submission_id.as_str()).collect();
            format!("ranking:{}", ids.join(">"))
        }
        Payload::Approval {
            approved_submission_ids,
        } => format!("approved:{}", approved_submission_ids.join(",")),
        Payload::Unrecognized { text } => format!("unrecognized:{}", text),
    }
}

fn duplicate_patterns(valid: &[&Ballot], thresholds: &AnomalyThresholds) -> Vec<AnomalyReport> {
    let min_voters = thresholds.duplicate_min_voters;
    let mut res = Vec::new();
    let groups = chronological_groups(valid, |b| {
        Some((b.submission_id.clone(), payload_signature(&b.payload)))
    });
    for ((submission_id, signature), group) in groups {
        let w = densest_window(
            &group,
            thresholds.duplicate_window_seconds,
            Measure::DistinctVoters,
        );
        if w.size >= min_voters as usize {
            debug!(
                "duplicate_patterns: {} voters cast {} on {:?}",
                w.size, signature, submission_id
            );
            res.push(AnomalyReport {
                kind: AnomalyKind::DuplicatePattern,
                subject: AnomalySubject::Voters(w.voters()),
                severity: Severity::Advisory,
                evidence: w.evidence(
                    format!(
                        "{} voters cast the identical ballot {} within {} seconds",
                        w.size, signature, thresholds.duplicate_window_seconds
                    ),
                    min_voters,
                ),
                submission_id,
            });
        }
    }
    res
}

fn ip_volume_outliers(valid: &[&Ballot]) -> Vec<AnomalyReport> {
    let groups = chronological_groups(valid, |b| {
        if b.ip_address == UNKNOWN || b.ip_address.is_empty() {
            None
        } else {
            Some(b.ip_address.clone())
        }
    });
    if groups.len() < 2 {
        return vec![];
    }
    let counts: Vec<f64> = groups.values().map(|g| g.len() as f64).collect();
    let cutoff = quantile(&counts, IP_VOLUME_QUANTILE);
    groups
        .into_iter()
        .filter(|(_, g)| g.len() as f64 > cutoff)
        .map(|(ip, g)| AnomalyReport {
            kind: AnomalyKind::IpVolumeOutlier,
            severity: Severity::Advisory,
            evidence: Evidence {
                description: format!(
                    "{} ballots from {}, above the 95th percentile of {:.2}",
                    g.len(),
                    ip,
                    cutoff
                ),
                ballot_ids: g.iter().map(|b| b.id.clone()).collect(),
                observed: g.len() as f64,
                limit: cutoff,
                window_start: g.first().map(|b| b.cast_at),
                window_end: g.last().map(|b| b.cast_at),
            },
            subject: AnomalySubject::IpAddress(ip),
            submission_id: None,
        })
        .collect()
}

// Consecutive ballots on the same submission, whoever cast them. A ballot
// that refers to several submissions is examined under each of them.
fn rapid_votes(valid: &[&Ballot], thresholds: &AnomalyThresholds) -> Vec<AnomalyReport> {
    let gap_ms = thresholds.rapid_vote_seconds.saturating_mul(1000);
    let mut by_submission: BTreeMap<&SubmissionId, Vec<&Ballot>> = BTreeMap::new();
    for b in valid.iter().cloned() {
        for sid in b.referenced_submissions() {
            by_submission.entry(sid).or_default().push(b);
        }
    }

    let mut res = Vec::new();
    for (sid, mut group) in by_submission {
        group.sort_by(|x, y| x.cast_at.cmp(&y.cast_at).then_with(|| x.id.cmp(&y.id)));
        let mut flagged: Vec<&Ballot> = Vec::new();
        let mut successions = 0;
        for pair in group.windows(2) {
            if (pair[1].cast_at - pair[0].cast_at).num_milliseconds() < gap_ms {
                successions += 1;
                if flagged.last().map(|b| b.id != pair[0].id).unwrap_or(true) {
                    flagged.push(pair[0]);
                }
                flagged.push(pair[1]);
            }
        }
        if successions == 0 {
            continue;
        }
        debug!("rapid_votes: {} quick successions on {}", successions, sid);
        res.push(AnomalyReport {
            kind: AnomalyKind::RapidVote,
            subject: AnomalySubject::Submission(sid.clone()),
            submission_id: Some(sid.clone()),
            severity: Severity::Advisory,
            evidence: Evidence {
                description: format!(
                    "{} ballots on {} followed the previous one within {} seconds",
                    successions, sid, thresholds.rapid_vote_seconds
                ),
                ballot_ids: flagged.iter().map(|b| b.id.clone()).collect(),
                observed: successions as f64,
                limit: thresholds.rapid_vote_seconds as f64,
                window_start: flagged.first().map(|b| b.cast_at),
                window_end: flagged.last().map(|b| b.cast_at),
            },
        });
    }
    res
}
