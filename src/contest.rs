mod config_reader;
mod io_common;
mod io_csv;
mod io_json;

use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use tally_engine::*;

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::contest::config_reader::*;

#[derive(Debug, Snafu)]
pub enum ContestError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Malformed ballot at line {lineno}: {message}"))]
    MalformedBallot { lineno: usize, message: String },
    #[snafu(display("Invalid competition configuration"))]
    Configuration { source: ConfigurationError },
    #[snafu(display("Cannot find the directory of {path}"))]
    MissingParentDir { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ContestResult<T> = Result<T, ContestError>;

#[derive(Serialize)]
struct Summary<'a> {
    competition: &'a str,
    scheme: Scheme,
    #[serde(flatten)]
    analysis: &'a Analysis,
}

fn read_summary(path: &str) -> ContestResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn read_ballot_log(root_path: &Path, source: &BallotSource, scheme: Scheme) -> ContestResult<Vec<RawBallot>> {
    let p: PathBuf = root_path.join(&source.file_path);
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read ballot log {:?}", p2);
    match source.provider.as_str() {
        "json" => io_json::read_json_ballots(&p2),
        "csv" => io_csv::read_csv_ballots(&p2, scheme),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

// The competition file, with the command line overrides applied.
fn load_config(args: &Args) -> ContestResult<(ContestConfig, PathBuf)> {
    let (mut config, root) = match &args.config {
        Some(path) => {
            let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
            let config: ContestConfig =
                serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
            let root = Path::new(path)
                .parent()
                .context(MissingParentDirSnafu { path })?
                .to_path_buf();
            (config, root)
        }
        None => match &args.scheme {
            Some(scheme) => (ContestConfig::new("contest", scheme), PathBuf::new()),
            None => whatever!("Either --config or --scheme must be provided"),
        },
    };

    if let Some(scheme) = &args.scheme {
        config.scheme = scheme.clone();
    }
    if let Some(input) = &args.input {
        config.ballot_sources = vec![BallotSource {
            provider: args.input_type.clone().unwrap_or_else(|| "json".to_string()),
            file_path: input.clone(),
        }];
    }
    if let Some(categories) = &args.categories {
        config.categories = Some(categories.clone());
    }
    Ok((config, root))
}

// When the competition does not list its candidates, every submission that
// appears in the log is one.
fn infer_candidates(raw_ballots: &[RawBallot]) -> Vec<Candidate> {
    let mut ids: BTreeSet<SubmissionId> = BTreeSet::new();
    for rb in raw_ballots.iter() {
        ids.extend(rb.submission_id.iter().cloned());
        match &rb.payload {
            RawPayload::Ranked { rankings } => {
                ids.extend(rankings.iter().map(|r| r.submission_id.clone()))
            }
            RawPayload::Ordered { ranking } => ids.extend(ranking.iter().cloned()),
            RawPayload::Approval {
                approved_submission_ids,
            } => ids.extend(approved_submission_ids.iter().cloned()),
            RawPayload::Rated { .. }
            | RawPayload::Quadratic { .. }
            | RawPayload::Unrecognized(_) => {}
        }
    }
    ids.iter().map(|id| Candidate::new(id)).collect()
}

// Only the top-level sections present in the reference are compared.
fn restrict_to(summary: &JSValue, reference: &JSValue) -> JSValue {
    match (summary, reference) {
        (JSValue::Object(s), JSValue::Object(r)) => {
            let m: JSMap<String, JSValue> = r
                .keys()
                .map(|k| (k.clone(), s.get(k).cloned().unwrap_or(JSValue::Null)))
                .collect();
            JSValue::Object(m)
        }
        _ => summary.clone(),
    }
}

fn check_reference(summary_js: &JSValue, reference_path: &str) -> ContestResult<()> {
    let summary_ref = read_summary(reference_path)?;
    debug!("reference summary: {:?}", summary_ref);
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
    let pretty_js_stats = serde_json::to_string_pretty(&restrict_to(summary_js, &summary_ref))
        .context(WritingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary");
        print_diff(
            pretty_js_summary_ref.as_str(),
            pretty_js_stats.as_ref(),
            "\n",
        );
        whatever!("Difference detected between calculated summary and reference summary")
    }
    info!("The summary matches the reference {}", reference_path);
    Ok(())
}

/// Runs a competition end to end and returns its JSON summary.
pub fn run_contest(args: &Args) -> ContestResult<JSValue> {
    let (config, root) = load_config(args)?;
    info!("config: {:?}", config);

    // Validate the settings before reading any ballot.
    let scheme = config.scheme()?;
    config.settings.validate().context(ConfigurationSnafu {})?;
    let categories = config.categories()?;
    let affiliations = config.affiliations()?;

    if config.ballot_sources.is_empty() {
        whatever!("No ballot sources: use --input or ballotSources in the configuration");
    }

    let mut raw_ballots: Vec<RawBallot> = Vec::new();
    for source in config.ballot_sources.iter() {
        let mut file_data = read_ballot_log(&root, source, scheme)?;
        raw_ballots.append(&mut file_data);
    }
    info!("Read {} ballots", raw_ballots.len());

    let candidates = if config.candidates.is_empty() {
        let cs = infer_candidates(&raw_ballots);
        warn!(
            "No candidates declared, using the {} submissions found in the ballots",
            cs.len()
        );
        cs
    } else {
        config.candidates.clone()
    };
    let candidate_ids: HashSet<SubmissionId> = candidates.iter().map(|c| c.id.clone()).collect();

    let ballots = normalize(&raw_ballots, scheme, &candidate_ids);
    let analysis = analyze(
        &ballots,
        scheme,
        &candidates,
        categories.as_deref(),
        &affiliations,
        &config.settings,
    )
    .context(ConfigurationSnafu {})?;

    let summary = Summary {
        competition: &config.name,
        scheme,
        analysis: &analysis,
    };
    let summary_js = serde_json::to_value(&summary).context(WritingJsonSnafu {})?;
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(WritingJsonSnafu {})?;

    match args.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            fs::write(path, &pretty_js_stats).context(WritingFileSnafu { path })?;
            info!("Summary written to {}", path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(&summary_js, reference_path)?;
    }

    Ok(summary_js)
}
