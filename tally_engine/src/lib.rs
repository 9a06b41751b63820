//! Vote tallying and integrity analysis for competitions.
//!
//! The engine takes raw ballots from an event log, normalizes them
//! ([`normalize`]), and computes three independent outputs from the
//! normalized set:
//! - a leaderboard for the competition's [`Scheme`] ([`compute_results`])
//! - descriptive statistics ([`compute_statistics`])
//! - an advisory anomaly report ([`compute_anomalies`])
//!
//! [`analyze`] computes the three of them concurrently.
//!
//! Every entry point is a pure function of its inputs. The only failure is a
//! [`ConfigurationError`], raised before any computation starts. Problems
//! with individual ballots are data: see [`ReasonCode`].

mod anomaly;
mod ballot;
pub mod builder;
mod config;
pub mod manual;
mod normalize;
mod numeric;
mod stats;
mod tally;

use std::collections::HashMap;
use std::thread;

use log::info;
use serde::{Deserialize, Serialize};

pub use crate::anomaly::{AnomalyKind, AnomalyReport, AnomalySubject, Evidence, Severity};
pub use crate::ballot::*;
pub use crate::config::*;
pub use crate::normalize::normalize;
pub use crate::stats::{
    DeviceFamily, Demographic, Distribution, Engagement, HourCount, Overview, Participation,
    Quality, Statistics, Temporal,
};
pub use crate::tally::RankedResult;

/// Ranks the submissions of a competition.
///
/// Arguments:
/// * `ballots` the normalized ballots. Ballots that are invalid, superseded or
///   of another scheme do not contribute.
/// * `scheme` the voting method of the competition
/// * `candidates` display metadata for the submissions. Submissions that
///   received votes but are not listed are shown under their id.
/// * `config` the competition settings
pub fn compute_results(
    ballots: &[Ballot],
    scheme: Scheme,
    candidates: &[Candidate],
    config: &EngineConfig,
) -> Result<Vec<RankedResult>, ConfigurationError> {
    config.validate()?;
    info!(
        "compute_results: {} ballots, scheme: {}, {} candidates",
        ballots.len(),
        scheme,
        candidates.len()
    );
    Ok(tally::tally(ballots, scheme, candidates, config))
}

/// Computes the requested statistics categories, or all of them when
/// `categories` is None.
///
/// `affiliations` maps voters to the group they declared. It is only used by
/// the demographic category.
pub fn compute_statistics(
    ballots: &[Ballot],
    categories: Option<&[StatCategory]>,
    affiliations: &HashMap<VoterKey, String>,
    config: &EngineConfig,
) -> Result<Statistics, ConfigurationError> {
    config.validate()?;
    info!(
        "compute_statistics: {} ballots, categories: {:?}",
        ballots.len(),
        categories
    );
    Ok(stats::aggregate(ballots, categories, affiliations, config))
}

/// Runs the anomaly heuristics. Default thresholds apply when none are given.
pub fn compute_anomalies(
    ballots: &[Ballot],
    thresholds: Option<&AnomalyThresholds>,
) -> Result<Vec<AnomalyReport>, ConfigurationError> {
    let thresholds = thresholds.unwrap_or(&AnomalyThresholds::DEFAULT);
    thresholds.validate()?;
    Ok(anomaly::detect(ballots, thresholds))
}

/// The three outputs of the engine for one competition.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub results: Vec<RankedResult>,
    pub statistics: Statistics,
    pub anomalies: Vec<AnomalyReport>,
}

/// Computes results, statistics and anomalies, each on its own thread.
///
/// The ballots are shared read-only between the computations. The outcome is
/// the same as calling the three entry points one after the other.
pub fn analyze(
    ballots: &[Ballot],
    scheme: Scheme,
    candidates: &[Candidate],
    categories: Option<&[StatCategory]>,
    affiliations: &HashMap<VoterKey, String>,
    config: &EngineConfig,
) -> Result<Analysis, ConfigurationError> {
    config.validate()?;
    info!("analyze: {} ballots, scheme: {}", ballots.len(), scheme);

    let (results, statistics, anomalies) = thread::scope(|s| {
        let results = s.spawn(|| tally::tally(ballots, scheme, candidates, config));
        let statistics = s.spawn(|| stats::aggregate(ballots, categories, affiliations, config));
        let anomalies = anomaly::detect(ballots, &config.thresholds);
        (
            results
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e)),
            statistics
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e)),
            anomalies,
        )
    });

    Ok(Analysis {
        results,
        statistics,
        anomalies,
    })
}
