// Primitives for reading CSV ballot logs.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Deserialize;
use snafu::prelude::*;
use tally_engine::*;

use crate::contest::io_common::{make_default_id, or_unknown, split_list, voter_key};
use crate::contest::{ContestResult, CsvLineParseSnafu, CsvOpenSnafu};

/// One row of a CSV log. Only the columns of the payload in use are filled.
///
/// Numeric payload columns are read as text so that a cell that does not
/// parse invalidates its own ballot instead of the whole log.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow {
    id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    submission_id: Option<String>,
    cast_at: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    weight: Option<f64>,
    value: Option<String>,
    vote_count: Option<String>,
    credits_spent: Option<String>,
    ranking: Option<String>,
    approved: Option<String>,
}

fn number(cell: &Option<String>) -> Option<Result<f64, &str>> {
    cell.as_deref().map(|s| s.parse::<f64>().map_err(|_| s))
}

fn unrecognized(row: &CsvRow) -> RawPayload {
    let cells: Vec<String> = [
        ("value", &row.value),
        ("voteCount", &row.vote_count),
        ("creditsSpent", &row.credits_spent),
    ]
    .into_iter()
    .filter_map(|(name, cell)| cell.as_ref().map(|c| format!("{}={}", name, c)))
    .collect();
    RawPayload::Unrecognized(cells.join(","))
}

// The payload columns are checked in order: value, voteCount and
// creditsSpent, ranking, approved. A row with none of them is an empty
// selection for the schemes that have one, and unrecognized otherwise.
fn row_payload(row: &CsvRow, scheme: Scheme, lineno: usize) -> RawPayload {
    let payload = match number(&row.value) {
        Some(Ok(value)) => Some(RawPayload::Rated { value }),
        Some(Err(_)) => Some(unrecognized(row)),
        None => match (number(&row.vote_count), number(&row.credits_spent)) {
            (None, None) => None,
            (Some(Ok(vote_count)), Some(Ok(credits_spent))) => Some(RawPayload::Quadratic {
                vote_count,
                credits_spent,
            }),
            // Half a quadratic payload, or a number that does not parse.
            _ => Some(unrecognized(row)),
        },
    };
    let payload = payload.unwrap_or_else(|| {
        if let Some(ranking) = &row.ranking {
            RawPayload::Ordered {
                ranking: split_list(ranking),
            }
        } else if let Some(approved) = &row.approved {
            RawPayload::Approval {
                approved_submission_ids: split_list(approved),
            }
        } else {
            match scheme {
                Scheme::Ranked => RawPayload::Ordered { ranking: vec![] },
                Scheme::Approval => RawPayload::Approval {
                    approved_submission_ids: vec![],
                },
                Scheme::Simple | Scheme::Quadratic => RawPayload::Unrecognized(String::new()),
            }
        }
    });
    if let RawPayload::Unrecognized(text) = &payload {
        warn!("read_csv_ballots: line {}: unrecognized payload {:?}", lineno, text);
    }
    payload
}

pub fn read_csv_ballots(path: &str, scheme: Scheme) -> ContestResult<Vec<RawBallot>> {
    let default_id = make_default_id(path);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let mut res: Vec<RawBallot> = Vec::new();
    for (idx, row_r) in rdr.deserialize::<CsvRow>().enumerate() {
        // The header is the first line.
        let lineno = idx + 2;
        let row = row_r.context(CsvLineParseSnafu { lineno })?;
        debug!("read_csv_ballots: lineno: {:?} row: {:?}", lineno, row);
        let payload = row_payload(&row, scheme, lineno);
        let voter = voter_key(row.user_id, row.session_id, lineno)?;
        res.push(RawBallot {
            id: row.id.unwrap_or_else(|| default_id(lineno)),
            submission_id: row.submission_id,
            voter,
            payload,
            weight: row.weight,
            ip_address: or_unknown(row.ip_address),
            user_agent: or_unknown(row.user_agent),
            cast_at: row.cast_at,
        });
    }
    Ok(res)
}
