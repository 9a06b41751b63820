use std::collections::HashSet;

use chrono::{DateTime, Utc};

pub use crate::config::*;
use crate::ballot::*;
use crate::normalize::normalize;
use crate::tally::{tally, RankedResult};

/// A builder for collecting the ballots of one competition.
///
/// Ballots get sequential ids (`b1`, `b2`, ...) and no network metadata.
/// Use [`Builder::add_raw`] to control every field.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tally_engine::builder::Builder;
/// use tally_engine::{ConfigurationError, EngineConfig, VoterKey};
///
/// let mut builder = Builder::from_name("ranked_choice")?
///     .candidates(&["Anna".to_string(), "Bob".to_string()]);
///
/// let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let voter = VoterKey::User("u1".to_string());
/// builder.add_ranking(&voter, &["Bob".to_string(), "Anna".to_string()], t);
///
/// let results = builder.results(&EngineConfig::DEFAULT)?;
/// assert_eq!(results[0].submission_id, "Bob");
/// assert_eq!(results[0].score, 2.0);
///
/// # Ok::<(), ConfigurationError>(())
/// ```
pub struct Builder {
    pub(crate) _scheme: Scheme,
    pub(crate) _candidates: Vec<Candidate>,
    pub(crate) _ballots: Vec<RawBallot>,
}

impl Builder {
    pub fn new(scheme: Scheme) -> Builder {
        Builder {
            _scheme: scheme,
            _candidates: Vec::new(),
            _ballots: Vec::new(),
        }
    }

    /// Starts a builder from a scheme identifier, including the legacy ones.
    pub fn from_name(scheme: &str) -> Result<Builder, ConfigurationError> {
        Ok(Builder::new(scheme.parse()?))
    }

    pub fn candidates(self, ids: &[String]) -> Builder {
        Builder {
            _scheme: self._scheme,
            _candidates: ids.iter().map(|id| Candidate::new(id)).collect(),
            _ballots: Vec::new(),
        }
    }

    /// Registers candidates with their display metadata.
    pub fn candidates_with_metadata(self, candidates: &[Candidate]) -> Builder {
        Builder {
            _scheme: self._scheme,
            _candidates: candidates.to_vec(),
            _ballots: Vec::new(),
        }
    }

    fn push(
        &mut self,
        voter: &VoterKey,
        submission_id: Option<&str>,
        payload: RawPayload,
        cast_at: DateTime<Utc>,
    ) {
        let id = format!("b{}", self._ballots.len() + 1);
        self.add_raw(RawBallot {
            id,
            submission_id: submission_id.map(|s| s.to_string()),
            voter: voter.clone(),
            payload,
            weight: None,
            ip_address: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
            cast_at,
        });
    }

    pub fn add_rating(
        &mut self,
        voter: &VoterKey,
        submission_id: &str,
        value: f64,
        cast_at: DateTime<Utc>,
    ) {
        self.push(voter, Some(submission_id), RawPayload::Rated { value }, cast_at)
    }

    /// Adds a quadratic ballot, paying `votes²` credits.
    pub fn add_quadratic(
        &mut self,
        voter: &VoterKey,
        submission_id: &str,
        votes: u32,
        cast_at: DateTime<Utc>,
    ) {
        let vote_count = votes as f64;
        let payload = RawPayload::Quadratic {
            vote_count,
            credits_spent: vote_count * vote_count,
        };
        self.push(voter, Some(submission_id), payload, cast_at)
    }

    /// Adds a ranked ballot.
    ///
    /// ranking: the submissions in order of preference, the preferred one first.
    pub fn add_ranking(&mut self, voter: &VoterKey, ranking: &[String], cast_at: DateTime<Utc>) {
        let payload = RawPayload::Ordered {
            ranking: ranking.to_vec(),
        };
        self.push(voter, None, payload, cast_at)
    }

    pub fn add_approval(&mut self, voter: &VoterKey, approved: &[String], cast_at: DateTime<Utc>) {
        let payload = RawPayload::Approval {
            approved_submission_ids: approved.to_vec(),
        };
        self.push(voter, None, payload, cast_at)
    }

    pub fn add_raw(&mut self, ballot: RawBallot) {
        self._ballots.push(ballot);
    }

    /// The normalized ballots, in insertion order.
    pub fn ballots(&self) -> Vec<Ballot> {
        let ids: HashSet<SubmissionId> = self._candidates.iter().map(|c| c.id.clone()).collect();
        normalize(&self._ballots, self._scheme, &ids)
    }

    pub fn results(&self, config: &EngineConfig) -> Result<Vec<RankedResult>, ConfigurationError> {
        config.validate()?;
        Ok(tally(
            &self.ballots(),
            self._scheme,
            &self._candidates,
            config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(sec: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap()
    }

    fn user(id: &str) -> VoterKey {
        VoterKey::User(id.to_string())
    }

    #[test]
    fn quadratic_credits_are_filled_in() {
        let mut b = Builder::new(Scheme::Quadratic).candidates(&["X".to_string()]);
        b.add_quadratic(&user("a"), "X", 4, at(0));
        let bs = b.ballots();
        assert_eq!(bs[0].id, "b1");
        assert!(bs[0].is_valid());
        let res = b.results(&EngineConfig::DEFAULT).unwrap();
        assert_eq!(res[0].score, 4.0);
        assert_eq!(res[0].total_credits, Some(16.0));
    }

    #[test]
    fn unregistered_submissions_are_rejected() {
        let mut b = Builder::new(Scheme::Simple).candidates(&["X".to_string()]);
        b.add_rating(&user("a"), "Y", 5.0, at(0));
        assert_eq!(b.ballots()[0].reason, Some(ReasonCode::UnknownSubmission));
        assert!(b.results(&EngineConfig::DEFAULT).unwrap().is_empty());
    }

    #[test]
    fn metadata_reaches_the_results() {
        let mut b = Builder::new(Scheme::Approval).candidates_with_metadata(&[Candidate {
            id: "X".to_string(),
            title: "Rain garden".to_string(),
            author: "Lee".to_string(),
        }]);
        b.add_approval(&user("a"), &["X".to_string()], at(0));
        b.add_approval(&VoterKey::Session("s1".to_string()), &["X".to_string()], at(1));
        let res = b.results(&EngineConfig::DEFAULT).unwrap();
        assert_eq!(res[0].title, "Rain garden");
        assert_eq!(res[0].approval_percentage, Some(100.0));
    }

    #[test]
    fn unknown_scheme_name() {
        assert!(Builder::from_name("plurality").is_err());
    }
}
