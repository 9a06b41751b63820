// ********* Input data structures ***********

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigurationError, Scheme};

pub type SubmissionId = String;

/// Placeholder used by the platform when an address or a user agent was not
/// recorded.
pub const UNKNOWN: &str = "unknown";

/// The deduplication identity of a ballot: an authenticated user or an
/// anonymous browser session, never both.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoterKey {
    User(String),
    Session(String),
}

impl Display for VoterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoterKey::User(id) => write!(f, "user:{}", id),
            VoterKey::Session(id) => write!(f, "session:{}", id),
        }
    }
}

impl FromStr for VoterKey {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("user", id)) if !id.is_empty() => Ok(VoterKey::User(id.to_string())),
            Some(("session", id)) if !id.is_empty() => Ok(VoterKey::Session(id.to_string())),
            _ => Err(ConfigurationError::InvalidVoterKey { key: s.to_string() }),
        }
    }
}

/// A position in a ranked ballot.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRanking {
    pub submission_id: SubmissionId,
    /// Kept as a plain number so that a fractional or negative rank
    /// invalidates one ballot instead of failing the whole log.
    pub rank: f64,
}

/// The payload of a ballot, in any of the shapes the platform produced over
/// time.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Rated {
        value: f64,
    },
    Quadratic {
        #[serde(rename = "voteCount")]
        vote_count: f64,
        #[serde(rename = "creditsSpent")]
        credits_spent: f64,
    },
    Ranked {
        rankings: Vec<RawRanking>,
    },
    /// Submissions listed from the most to the least preferred.
    Ordered {
        ranking: Vec<SubmissionId>,
    },
    Approval {
        #[serde(rename = "approvedSubmissionIds")]
        approved_submission_ids: Vec<SubmissionId>,
    },
    /// A payload of no known shape, kept as the text that was read. The
    /// ballot it belongs to is invalid, but the rest of the log is not.
    Unrecognized(String),
}

impl RawPayload {
    /// The scheme this payload shape belongs to, if any.
    pub fn scheme(&self) -> Option<Scheme> {
        match self {
            RawPayload::Rated { .. } => Some(Scheme::Simple),
            RawPayload::Quadratic { .. } => Some(Scheme::Quadratic),
            RawPayload::Ranked { .. } | RawPayload::Ordered { .. } => Some(Scheme::Ranked),
            RawPayload::Approval { .. } => Some(Scheme::Approval),
            RawPayload::Unrecognized(_) => None,
        }
    }
}

/// A ballot as read from the event log.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBallot {
    pub id: String,
    pub submission_id: Option<SubmissionId>,
    pub voter: VoterKey,
    pub payload: RawPayload,
    /// Defaults to 1.
    pub weight: Option<f64>,
    pub ip_address: String,
    pub user_agent: String,
    pub cast_at: DateTime<Utc>,
}

/// A submission that can receive votes, with its display metadata.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: SubmissionId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

impl Candidate {
    pub fn new(id: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            title: id.to_string(),
            author: String::new(),
        }
    }
}

// ********* Canonical data structures ***********

/// Why a ballot was rejected by the normalizer.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// A number outside of its domain (rating, vote count, rank, weight).
    OutOfRange,
    /// A reference to a submission outside of the candidate set.
    UnknownSubmission,
    /// The same rank, or the same submission, appears twice in a ranking.
    DuplicateRank,
    /// Quadratic credits that are not the square of the vote count.
    CreditMismatch,
    /// An empty ranking or approval set.
    EmptySelection,
    /// The payload shape belongs to another scheme.
    SchemeMismatch,
    /// A rating or a quadratic ballot that does not target a submission.
    MissingSubmission,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::OutOfRange => "OUT_OF_RANGE",
            ReasonCode::UnknownSubmission => "UNKNOWN_SUBMISSION",
            ReasonCode::DuplicateRank => "DUPLICATE_RANK",
            ReasonCode::CreditMismatch => "CREDIT_MISMATCH",
            ReasonCode::EmptySelection => "EMPTY_SELECTION",
            ReasonCode::SchemeMismatch => "SCHEME_MISMATCH",
            ReasonCode::MissingSubmission => "MISSING_SUBMISSION",
        }
    }
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub submission_id: SubmissionId,
    pub rank: i64,
}

/// Scheme-specific content of a canonical ballot.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    Simple {
        value: f64,
    },
    #[serde(rename_all = "camelCase")]
    Quadratic {
        vote_count: i64,
        credits_spent: f64,
    },
    Ranked {
        rankings: Vec<Ranking>,
    },
    /// Sorted, without duplicates.
    #[serde(rename_all = "camelCase")]
    Approval {
        approved_submission_ids: Vec<SubmissionId>,
    },
    Unrecognized {
        text: String,
    },
}

impl From<&RawPayload> for Payload {
    fn from(raw: &RawPayload) -> Payload {
        match raw {
            RawPayload::Rated { value } => Payload::Simple { value: *value },
            RawPayload::Quadratic {
                vote_count,
                credits_spent,
            } => Payload::Quadratic {
                vote_count: vote_count.trunc() as i64,
                credits_spent: *credits_spent,
            },
            RawPayload::Ranked { rankings } => Payload::Ranked {
                rankings: rankings
                    .iter()
                    .map(|r| Ranking {
                        submission_id: r.submission_id.clone(),
                        rank: r.rank.trunc() as i64,
                    })
                    .collect(),
            },
            RawPayload::Ordered { ranking } => Payload::Ranked {
                rankings: ranking
                    .iter()
                    .enumerate()
                    .map(|(idx, sid)| Ranking {
                        submission_id: sid.clone(),
                        rank: (idx + 1) as i64,
                    })
                    .collect(),
            },
            RawPayload::Approval {
                approved_submission_ids,
            } => {
                let mut ids = approved_submission_ids.clone();
                ids.sort();
                ids.dedup();
                Payload::Approval {
                    approved_submission_ids: ids,
                }
            }
            RawPayload::Unrecognized(text) => Payload::Unrecognized { text: text.clone() },
        }
    }
}

/// A ballot after normalization.
///
/// Ballots are never dropped by the normalizer: an invalid ballot carries the
/// reason of its rejection, and a superseded ballot is marked inactive. Only
/// ballots that are both valid and active contribute to a tally.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: String,
    pub submission_id: Option<SubmissionId>,
    pub voter: VoterKey,
    pub scheme: Scheme,
    pub payload: Payload,
    pub weight: f64,
    pub ip_address: String,
    pub user_agent: String,
    pub cast_at: DateTime<Utc>,
    pub reason: Option<ReasonCode>,
    /// False when a more recent ballot of the same voter for the same target
    /// replaced this one.
    pub active: bool,
}

impl Ballot {
    pub fn is_valid(&self) -> bool {
        self.reason.is_none()
    }

    /// True when the ballot takes part in the tally.
    pub fn counts(&self) -> bool {
        self.is_valid() && self.active
    }

    /// All the submissions this ballot refers to, whether it is valid or not.
    pub fn referenced_submissions(&self) -> Vec<&SubmissionId> {
        match &self.payload {
            Payload::Ranked { rankings } => rankings.iter().map(|r| &r.submission_id).collect(),
            Payload::Approval {
                approved_submission_ids,
            } => approved_submission_ids.iter().collect(),
            Payload::Simple { .. } | Payload::Quadratic { .. } | Payload::Unrecognized { .. } => {
                self.submission_id.iter().collect()
            }
        }
    }
}

/// The leading part of an address: `octets` bytes of an IPv4 address, or
/// `octets` 16-bit segments of an IPv6 address. Returns None for addresses
/// that cannot be parsed, including the `unknown` placeholder.
pub fn ip_prefix(address: &str, octets: u8) -> Option<String> {
    let n = octets as usize;
    if let Ok(v4) = address.trim().parse::<Ipv4Addr>() {
        let parts: Vec<String> = v4.octets().iter().take(n).map(|o| o.to_string()).collect();
        return Some(parts.join("."));
    }
    if let Ok(v6) = address.trim().parse::<Ipv6Addr>() {
        let parts: Vec<String> = v6
            .segments()
            .iter()
            .take(n)
            .map(|s| format!("{:x}", s))
            .collect();
        return Some(parts.join(":"));
    }
    None
}
