//! Scheme-independent statistics over a ballot set.
//!
//! Each category is computed in one pass over the ballots with map-based
//! accumulation. Categories are independent: the caller only pays for what it
//! requests.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ballot::*;
use crate::config::{EngineConfig, Scheme, StatCategory};
use crate::numeric::{mean, median, percentage, std_dev};

/// Number of leading IPv4 octets kept for the demographic breakdown.
const DEMOGRAPHIC_PREFIX_OCTETS: u8 = 2;
const PEAK_HOURS: usize = 3;
const HIGHLY_ENGAGED: u64 = 5;
const MODERATELY_ENGAGED: u64 = 2;

// ******** Output data structures *********

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub overview: Option<Overview>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub participation: Option<Participation>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temporal: Option<Temporal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub demographic: Option<Demographic>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub engagement: Option<Engagement>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quality: Option<Quality>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_ballots: u64,
    pub valid_ballots: u64,
    pub invalid_ballots: u64,
    /// Percentage of valid ballots.
    pub validity_rate: f64,
    pub distinct_voters: u64,
    /// Submissions referenced by at least one valid ballot.
    pub distinct_submissions: u64,
    pub mean_ballots_per_voter: f64,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl Distribution {
    fn of(values: &[f64]) -> Distribution {
        if values.is_empty() {
            return Distribution::default();
        }
        // Map iteration order is arbitrary: sort so that float sums are
        // reproducible.
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Distribution {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: mean(&sorted),
            median: median(&sorted),
            std_dev: std_dev(&sorted),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub ballots_per_voter: Distribution,
    pub votes_per_submission: Distribution,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourCount {
    pub hour: u32,
    pub count: u64,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Temporal {
    pub first_ballot: Option<DateTime<Utc>>,
    pub last_ballot: Option<DateTime<Utc>>,
    /// Hour of day (UTC) to number of ballots.
    pub by_hour: BTreeMap<u32, u64>,
    pub by_day: BTreeMap<NaiveDate, u64>,
    /// The busiest hours, busiest first.
    pub peak_hours: Vec<HourCount>,
    /// Ballots per minute between the first and the last ballot.
    pub velocity_per_minute: f64,
}

/// Coarse device or browser family, from user agent substrings.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum DeviceFamily {
    Mobile,
    Chrome,
    Firefox,
    Safari,
    Unknown,
}

impl DeviceFamily {
    /// Mobile takes precedence, and Chrome is checked before Safari since
    /// Chrome user agents also mention Safari.
    pub fn from_user_agent(user_agent: &str) -> DeviceFamily {
        if user_agent.contains("Mobile") {
            DeviceFamily::Mobile
        } else if user_agent.contains("Chrome") {
            DeviceFamily::Chrome
        } else if user_agent.contains("Firefox") {
            DeviceFamily::Firefox
        } else if user_agent.contains("Safari") {
            DeviceFamily::Safari
        } else {
            DeviceFamily::Unknown
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographic {
    /// Ballots per declared affiliation of their voter. Voters without a
    /// declared affiliation are counted under `Unknown`.
    pub by_affiliation: BTreeMap<String, u64>,
    /// Ballots per leading two octets of the address.
    pub by_ip_prefix: BTreeMap<String, u64>,
    pub by_device: BTreeMap<DeviceFamily, u64>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    /// Voters with 5 ballots or more.
    pub highly_engaged: u64,
    /// Voters with 2 to 4 ballots.
    pub moderately_engaged: u64,
    pub low_engaged: u64,
    pub engagement_rate: f64,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quality {
    pub valid_percentage: f64,
    pub invalid_count: u64,
    pub invalid_by_reason: BTreeMap<ReasonCode, u64>,
    /// Mean over the submissions with at least 2 ratings of the standard
    /// deviation of their ratings. Lower means more agreement.
    pub mean_consistency: f64,
    pub consistency_by_submission: BTreeMap<SubmissionId, f64>,
}

// ******** Aggregation *********

/// Computes the requested categories (all of them when `categories` is None).
pub(crate) fn aggregate(
    ballots: &[Ballot],
    categories: Option<&[StatCategory]>,
    affiliations: &HashMap<VoterKey, String>,
    config: &EngineConfig,
) -> Statistics {
    let requested: HashSet<StatCategory> = match categories {
        Some(cs) => cs.iter().cloned().collect(),
        None => StatCategory::ALL.iter().cloned().collect(),
    };
    let considered: Vec<&Ballot> = ballots
        .iter()
        .filter(|b| config.include_invalid_in_statistics || b.is_valid())
        .collect();
    debug!(
        "aggregate: {} ballots, {} considered, categories: {:?}",
        ballots.len(),
        considered.len(),
        requested
    );

    let wants = |c: StatCategory| requested.contains(&c);
    Statistics {
        overview: wants(StatCategory::Overview).then(|| overview(ballots, &considered)),
        participation: wants(StatCategory::Participation).then(|| participation(&considered)),
        temporal: wants(StatCategory::Temporal).then(|| temporal(&considered)),
        demographic: wants(StatCategory::Demographic)
            .then(|| demographic(&considered, affiliations)),
        engagement: wants(StatCategory::Engagement).then(|| engagement(&considered)),
        quality: wants(StatCategory::Quality).then(|| quality(ballots)),
    }
}

fn ballots_per_voter<'a>(ballots: &[&'a Ballot]) -> HashMap<&'a VoterKey, u64> {
    let mut res: HashMap<&VoterKey, u64> = HashMap::new();
    for b in ballots.iter() {
        *res.entry(&b.voter).or_insert(0) += 1;
    }
    res
}

fn votes_per_submission<'a>(ballots: &[&'a Ballot]) -> HashMap<&'a SubmissionId, u64> {
    let mut res: HashMap<&SubmissionId, u64> = HashMap::new();
    for b in ballots.iter() {
        for sid in b.referenced_submissions() {
            *res.entry(sid).or_insert(0) += 1;
        }
    }
    res
}

// Validity counts always cover the whole ballot set. Submissions only count
// once a valid ballot refers to them.
fn overview(all: &[Ballot], considered: &[&Ballot]) -> Overview {
    let total = all.len() as u64;
    let valid = all.iter().filter(|b| b.is_valid()).count() as u64;
    let per_voter = ballots_per_voter(considered);
    let receiving: HashSet<&SubmissionId> = considered
        .iter()
        .filter(|b| b.is_valid())
        .flat_map(|b| b.referenced_submissions())
        .collect();
    Overview {
        total_ballots: total,
        valid_ballots: valid,
        invalid_ballots: total - valid,
        validity_rate: percentage(valid as f64, total as f64),
        distinct_voters: per_voter.len() as u64,
        distinct_submissions: receiving.len() as u64,
        mean_ballots_per_voter: if per_voter.is_empty() {
            0.0
        } else {
            considered.len() as f64 / per_voter.len() as f64
        },
    }
}

fn participation(considered: &[&Ballot]) -> Participation {
    let per_voter: Vec<f64> = ballots_per_voter(considered)
        .values()
        .map(|c| *c as f64)
        .collect();
    let per_submission: Vec<f64> = votes_per_submission(considered)
        .values()
        .map(|c| *c as f64)
        .collect();
    Participation {
        ballots_per_voter: Distribution::of(&per_voter),
        votes_per_submission: Distribution::of(&per_submission),
    }
}

fn temporal(considered: &[&Ballot]) -> Temporal {
    let mut res = Temporal::default();
    for b in considered.iter() {
        *res.by_hour.entry(b.cast_at.hour()).or_insert(0) += 1;
        *res.by_day.entry(b.cast_at.date_naive()).or_insert(0) += 1;
        res.first_ballot = Some(res.first_ballot.map_or(b.cast_at, |f| f.min(b.cast_at)));
        res.last_ballot = Some(res.last_ballot.map_or(b.cast_at, |l| l.max(b.cast_at)));
    }

    let mut hours: Vec<HourCount> = res
        .by_hour
        .iter()
        .map(|(hour, count)| HourCount {
            hour: *hour,
            count: *count,
        })
        .collect();
    hours.sort_by(|a, b| b.count.cmp(&a.count).then(a.hour.cmp(&b.hour)));
    hours.truncate(PEAK_HOURS);
    res.peak_hours = hours;

    if let (Some(first), Some(last)) = (res.first_ballot, res.last_ballot) {
        let minutes = (last - first).num_milliseconds() as f64 / 60_000.0;
        if considered.len() >= 2 && minutes > 0.0 {
            res.velocity_per_minute = considered.len() as f64 / minutes;
        }
    }
    res
}

fn demographic(considered: &[&Ballot], affiliations: &HashMap<VoterKey, String>) -> Demographic {
    let mut res = Demographic::default();
    for b in considered.iter() {
        let affiliation = affiliations
            .get(&b.voter)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        *res.by_affiliation.entry(affiliation).or_insert(0) += 1;
        let prefix = ip_prefix(&b.ip_address, DEMOGRAPHIC_PREFIX_OCTETS)
            .unwrap_or_else(|| UNKNOWN.to_string());
        *res.by_ip_prefix.entry(prefix).or_insert(0) += 1;
        *res
            .by_device
            .entry(DeviceFamily::from_user_agent(&b.user_agent))
            .or_insert(0) += 1;
    }
    res
}

fn engagement(considered: &[&Ballot]) -> Engagement {
    let mut res = Engagement::default();
    let per_voter = ballots_per_voter(considered);
    for count in per_voter.values() {
        match *count {
            c if c >= HIGHLY_ENGAGED => res.highly_engaged += 1,
            c if c >= MODERATELY_ENGAGED => res.moderately_engaged += 1,
            _ => res.low_engaged += 1,
        }
    }
    res.engagement_rate = percentage(
        (res.highly_engaged + res.moderately_engaged) as f64,
        per_voter.len() as f64,
    );
    res
}

// Quality always looks at the whole ballot set, invalid ballots included.
fn quality(all: &[Ballot]) -> Quality {
    let mut res = Quality::default();
    let mut ratings: HashMap<&SubmissionId, Vec<f64>> = HashMap::new();
    for b in all.iter() {
        match (b.reason, &b.payload, &b.submission_id) {
            (Some(reason), _, _) => {
                res.invalid_count += 1;
                *res.invalid_by_reason.entry(reason).or_insert(0) += 1;
            }
            (None, Payload::Simple { value }, Some(sid)) if b.scheme == Scheme::Simple => {
                ratings.entry(sid).or_default().push(*value);
            }
            _ => {}
        }
    }
    res.valid_percentage = percentage(
        (all.len() as u64 - res.invalid_count) as f64,
        all.len() as f64,
    );
    for (sid, values) in ratings.into_iter().filter(|(_, vs)| vs.len() >= 2) {
        res.consistency_by_submission
            .insert(sid.clone(), std_dev(&values));
    }
    let spreads: Vec<f64> = res.consistency_by_submission.values().cloned().collect();
    res.mean_consistency = mean(&spreads);
    res
}
