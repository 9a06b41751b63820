// Primitives shared by the ballot log readers.

use std::path::Path;

use tally_engine::*;

use crate::contest::{ContestResult, MalformedBallotSnafu};

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Ids for ballots that do not carry one: the file name and the line number.
pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|x| x.trim().to_string()).filter(|x| !x.is_empty())
}

/// A ballot has exactly one of a user id and a session id.
pub fn voter_key(
    user_id: Option<String>,
    session_id: Option<String>,
    lineno: usize,
) -> ContestResult<VoterKey> {
    match (non_empty(user_id), non_empty(session_id)) {
        (Some(u), None) => Ok(VoterKey::User(u)),
        (None, Some(s)) => Ok(VoterKey::Session(s)),
        (Some(_), Some(_)) => MalformedBallotSnafu {
            lineno,
            message: "both a user id and a session id",
        }
        .fail(),
        (None, None) => MalformedBallotSnafu {
            lineno,
            message: "neither a user id nor a session id",
        }
        .fail(),
    }
}

/// Missing network metadata is recorded as `unknown`.
pub fn or_unknown(s: Option<String>) -> String {
    non_empty(s).unwrap_or_else(|| UNKNOWN.to_string())
}

/// Splits a `;`-separated list of submission ids.
pub fn split_list(s: &str) -> Vec<SubmissionId> {
    s.split(';')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}
