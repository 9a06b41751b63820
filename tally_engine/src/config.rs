// ********* Voting schemes ***********

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// The voting method of a competition.
///
/// The scheme is fixed for a competition. Every ballot carries it so that the
/// normalizer can reject payloads that belong to another method.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// One rating between 1 and 10 per submission. Also known as `traditional`.
    #[serde(alias = "traditional")]
    Simple,
    /// Votes on one submission cost their square in credits.
    Quadratic,
    /// Borda count over a preference order. Also known as `ranked_choice`.
    #[serde(alias = "ranked_choice")]
    Ranked,
    /// A set of approved submissions.
    Approval,
}

impl Scheme {
    pub const ALL: [Scheme; 4] = [
        Scheme::Simple,
        Scheme::Quadratic,
        Scheme::Ranked,
        Scheme::Approval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Simple => "simple",
            Scheme::Quadratic => "quadratic",
            Scheme::Ranked => "ranked",
            Scheme::Approval => "approval",
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "traditional" => Ok(Scheme::Simple),
            "quadratic" => Ok(Scheme::Quadratic),
            "ranked" | "ranked_choice" => Ok(Scheme::Ranked),
            "approval" => Ok(Scheme::Approval),
            _ => UnknownSchemeSnafu { name: s }.fail(),
        }
    }
}

/// The sections of the statistics report.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatCategory {
    Overview,
    Participation,
    Temporal,
    Demographic,
    Engagement,
    Quality,
}

impl StatCategory {
    pub const ALL: [StatCategory; 6] = [
        StatCategory::Overview,
        StatCategory::Participation,
        StatCategory::Temporal,
        StatCategory::Demographic,
        StatCategory::Engagement,
        StatCategory::Quality,
    ];
}

impl FromStr for StatCategory {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overview" => Ok(StatCategory::Overview),
            "participation" => Ok(StatCategory::Participation),
            "temporal" => Ok(StatCategory::Temporal),
            "demographic" => Ok(StatCategory::Demographic),
            "engagement" => Ok(StatCategory::Engagement),
            "quality" => Ok(StatCategory::Quality),
            _ => UnknownCategorySnafu { name: s }.fail(),
        }
    }
}

// ********* Errors **********

/// Errors that prevent the engine from starting a computation.
///
/// Problems with individual ballots are never reported here: they are
/// recorded on the ballot itself (see [`crate::ReasonCode`]).
#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigurationError {
    #[snafu(display("Unknown voting scheme {name:?}"))]
    UnknownScheme { name: String },

    #[snafu(display("Unknown statistics category {name:?}"))]
    UnknownCategory { name: String },

    #[snafu(display("Cannot parse voter key {key:?} (expected user:<id> or session:<id>)"))]
    InvalidVoterKey { key: String },

    #[snafu(display("Threshold {name} must be at least {minimum}, but it was {value}"))]
    InvalidThreshold {
        name: &'static str,
        value: u32,
        minimum: u32,
    },

    #[snafu(display("Window {name} may not be negative, but it was {value} seconds"))]
    InvalidWindow { name: &'static str, value: i64 },

    #[snafu(display("The per-voter credit budget must be a positive number, but it was {value}"))]
    InvalidBudget { value: f64 },

    #[snafu(display("IP prefixes are between 1 and 4 octets long, got {value}"))]
    InvalidPrefix { value: u8 },
}

// ********* Configuration **********

/// Switches for the individual anomaly heuristics.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Detectors {
    pub velocity_spike: bool,
    pub credit_budget: bool,
    pub ip_clustering: bool,
    pub duplicate_pattern: bool,
    pub ip_volume_outlier: bool,
    pub rapid_vote: bool,
}

impl Detectors {
    pub const ALL: Detectors = Detectors {
        velocity_spike: true,
        credit_budget: true,
        ip_clustering: true,
        duplicate_pattern: true,
        ip_volume_outlier: true,
        rapid_vote: true,
    };
}

impl Default for Detectors {
    fn default() -> Self {
        Detectors::ALL
    }
}

/// Thresholds of the anomaly detector. All of them can be overridden for a
/// single invocation.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnomalyThresholds {
    /// A voter casting strictly more valid ballots than this inside one
    /// velocity window is reported.
    pub velocity_spike_threshold: u32,
    pub velocity_window_seconds: i64,
    /// Strictly more distinct voters than this behind one IP prefix inside
    /// one cluster window is reported.
    pub ip_cluster_threshold: u32,
    pub ip_cluster_window_seconds: i64,
    /// Number of leading IPv4 octets (or IPv6 segments) that form a prefix.
    pub ip_cluster_prefix_octets: u8,
    pub duplicate_window_seconds: i64,
    /// Identical payloads from at least this many voters are reported.
    pub duplicate_min_voters: u32,
    /// Consecutive ballots on one submission, from any voters, strictly
    /// closer than this are reported.
    pub rapid_vote_seconds: i64,
    /// Credits a voter may spend across the whole competition. Quadratic only.
    pub per_voter_credit_budget: Option<f64>,
    pub detectors: Detectors,
}

impl AnomalyThresholds {
    pub const DEFAULT: AnomalyThresholds = AnomalyThresholds {
        velocity_spike_threshold: 10,
        velocity_window_seconds: 60,
        ip_cluster_threshold: 5,
        ip_cluster_window_seconds: 300,
        ip_cluster_prefix_octets: 3,
        duplicate_window_seconds: 30,
        duplicate_min_voters: 3,
        rapid_vote_seconds: 5,
        per_voter_credit_budget: None,
        detectors: Detectors::ALL,
    };

    /// Checks that the thresholds can be applied. Nothing is computed when
    /// this fails.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_threshold("velocitySpikeThreshold", self.velocity_spike_threshold, 1)?;
        check_threshold("ipClusterThreshold", self.ip_cluster_threshold, 1)?;
        check_threshold("duplicateMinVoters", self.duplicate_min_voters, 2)?;
        check_window("velocityWindowSeconds", self.velocity_window_seconds)?;
        check_window("ipClusterWindowSeconds", self.ip_cluster_window_seconds)?;
        check_window("duplicateWindowSeconds", self.duplicate_window_seconds)?;
        check_window("rapidVoteSeconds", self.rapid_vote_seconds)?;
        ensure!(
            (1..=4).contains(&self.ip_cluster_prefix_octets),
            InvalidPrefixSnafu {
                value: self.ip_cluster_prefix_octets
            }
        );
        if let Some(budget) = self.per_voter_credit_budget {
            ensure!(
                budget.is_finite() && budget > 0.0,
                InvalidBudgetSnafu { value: budget }
            );
        }
        Ok(())
    }
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        AnomalyThresholds::DEFAULT
    }
}

/// Settings of one competition. Every field is optional in serialized form.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// When false, statistics other than the validity counts and the quality
    /// section only look at valid ballots.
    pub include_invalid_in_statistics: bool,
    /// Drops the quadratic ballots of voters above `perVoterCreditBudget`
    /// from the tally.
    pub enforce_credit_budget: bool,
    #[serde(flatten)]
    pub thresholds: AnomalyThresholds,
}

impl EngineConfig {
    pub const DEFAULT: EngineConfig = EngineConfig {
        include_invalid_in_statistics: true,
        enforce_credit_budget: false,
        thresholds: AnomalyThresholds::DEFAULT,
    };

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.thresholds.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::DEFAULT
    }
}

fn check_threshold(
    name: &'static str,
    value: u32,
    minimum: u32,
) -> Result<(), ConfigurationError> {
    ensure!(
        value >= minimum,
        InvalidThresholdSnafu {
            name,
            value,
            minimum
        }
    );
    Ok(())
}

fn check_window(name: &'static str, value: i64) -> Result<(), ConfigurationError> {
    ensure!(value >= 0, InvalidWindowSnafu { name, value });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_accepts_legacy_names() {
        assert_eq!("traditional".parse::<Scheme>(), Ok(Scheme::Simple));
        assert_eq!("Ranked_Choice".parse::<Scheme>(), Ok(Scheme::Ranked));
        assert_eq!(" approval ".parse::<Scheme>(), Ok(Scheme::Approval));
    }

    #[test]
    fn unknown_scheme_is_a_configuration_error() {
        let err = "plurality".parse::<Scheme>().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownScheme {
                name: "plurality".to_string()
            }
        );
    }

    #[test]
    fn negative_window_is_rejected() {
        let mut t = AnomalyThresholds::DEFAULT;
        t.ip_cluster_window_seconds = -5;
        assert!(matches!(
            t.validate(),
            Err(ConfigurationError::InvalidWindow {
                name: "ipClusterWindowSeconds",
                value: -5
            })
        ));
    }

    #[test]
    fn rapid_vote_window() {
        assert_eq!(AnomalyThresholds::DEFAULT.rapid_vote_seconds, 5);
        let mut t = AnomalyThresholds::DEFAULT;
        t.rapid_vote_seconds = -1;
        assert_eq!(
            t.validate(),
            Err(ConfigurationError::InvalidWindow {
                name: "rapidVoteSeconds",
                value: -1
            })
        );
        let c: EngineConfig =
            serde_json::from_str(r#"{"rapidVoteSeconds": 2, "detectors": {"rapidVote": false}}"#)
                .unwrap();
        assert_eq!(c.thresholds.rapid_vote_seconds, 2);
        assert!(!c.thresholds.detectors.rapid_vote);
    }

    #[test]
    fn budget_and_prefix_are_checked() {
        let mut t = AnomalyThresholds::DEFAULT;
        t.per_voter_credit_budget = Some(-1.0);
        assert!(matches!(
            t.validate(),
            Err(ConfigurationError::InvalidBudget { .. })
        ));
        let mut t = AnomalyThresholds::DEFAULT;
        t.per_voter_credit_budget = Some(0.0);
        assert_eq!(t.validate(), Err(ConfigurationError::InvalidBudget { value: 0.0 }));
        t.per_voter_credit_budget = Some(0.5);
        assert_eq!(t.validate(), Ok(()));
        let mut t = AnomalyThresholds::DEFAULT;
        t.ip_cluster_prefix_octets = 0;
        assert!(matches!(
            t.validate(),
            Err(ConfigurationError::InvalidPrefix { value: 0 })
        ));
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
        assert_eq!(EngineConfig::default().thresholds.velocity_spike_threshold, 10);
        assert!(EngineConfig::default().include_invalid_in_statistics);
    }

    #[test]
    fn config_reads_flat_camel_case() {
        let js = r#"{"perVoterCreditBudget": 100, "velocitySpikeThreshold": 4,
                     "includeInvalidInStatistics": false,
                     "detectors": {"duplicatePattern": false}}"#;
        let c: EngineConfig = serde_json::from_str(js).unwrap();
        assert_eq!(c.thresholds.per_voter_credit_budget, Some(100.0));
        assert_eq!(c.thresholds.velocity_spike_threshold, 4);
        assert_eq!(c.thresholds.ip_cluster_threshold, 5);
        assert!(!c.include_invalid_in_statistics);
        assert!(!c.thresholds.detectors.duplicate_pattern);
        assert!(c.thresholds.detectors.velocity_spike);
    }
}
