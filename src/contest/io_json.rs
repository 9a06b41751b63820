// Reading ballot logs exported as a JSON array.

use std::fs;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Deserialize;
use snafu::prelude::*;
use tally_engine::*;

use crate::contest::io_common::{make_default_id, or_unknown, voter_key};
use crate::contest::{ContestResult, OpeningFileSnafu, ParsingJsonSnafu};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonBallot {
    id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    submission_id: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
    weight: Option<f64>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    cast_at: DateTime<Utc>,
}

// A payload that matches no known shape invalidates its own ballot only.
fn entry_payload(payload: serde_json::Value, lineno: usize) -> RawPayload {
    let text = payload.to_string();
    match serde_json::from_value::<RawPayload>(payload) {
        Ok(p) => p,
        Err(e) => {
            warn!("read_json_ballots: entry {}: unrecognized payload {}: {}", lineno, text, e);
            RawPayload::Unrecognized(text)
        }
    }
}

pub fn read_json_ballots(path: &str) -> ContestResult<Vec<RawBallot>> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let entries: Vec<JsonBallot> =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    let default_id = make_default_id(path);

    let mut res: Vec<RawBallot> = Vec::new();
    for (idx, entry) in entries.into_iter().enumerate() {
        // Entries are numbered from 1.
        let lineno = idx + 1;
        let voter = voter_key(entry.user_id, entry.session_id, lineno)?;
        let rb = RawBallot {
            id: entry.id.unwrap_or_else(|| default_id(lineno)),
            submission_id: entry.submission_id,
            voter,
            payload: entry_payload(entry.payload, lineno),
            weight: entry.weight,
            ip_address: or_unknown(entry.ip_address),
            user_agent: or_unknown(entry.user_agent),
            cast_at: entry.cast_at,
        };
        debug!("read_json_ballots: {:?}", rb);
        res.push(rb);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_log(name: &str, contents: &str) -> String {
        let path = format!("{}/{}", std::env::temp_dir().display(), name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_every_payload_shape() {
        let path = write_log(
            "ctally_io_json_shapes.json",
            r#"[
              {"id": "b1", "userId": "7", "submissionId": "s1", "payload": {"value": 8},
               "castAt": "2024-05-01T10:00:00Z", "ipAddress": "10.0.0.1"},
              {"sessionId": "x", "payload": {"ranking": ["s2", "s1"]},
               "castAt": "2024-05-01T10:00:05Z"},
              {"userId": "8", "submissionId": "s1", "weight": 2,
               "payload": {"voteCount": 2, "creditsSpent": 4}, "castAt": "2024-05-01T10:00:09Z"}
            ]"#,
        );
        let bs = read_json_ballots(&path).unwrap();
        assert_eq!(bs.len(), 3);
        assert_eq!(bs[0].payload, RawPayload::Rated { value: 8.0 });
        assert_eq!(bs[0].ip_address, "10.0.0.1");
        assert_eq!(bs[1].id, "ctally_io_json_shapes.json-00000002");
        assert_eq!(bs[1].voter, VoterKey::Session("x".to_string()));
        assert_eq!(bs[1].user_agent, UNKNOWN);
        assert_eq!(bs[2].payload.scheme(), Some(Scheme::Quadratic));
        assert_eq!(bs[2].weight, Some(2.0));
    }

    #[test]
    fn bad_payload_only_invalidates_its_ballot() {
        let path = write_log(
            "ctally_io_json_bad_payload.json",
            r#"[
              {"id": "b1", "userId": "7", "submissionId": "s1", "payload": {"value": 8},
               "castAt": "2024-05-01T10:00:00Z"},
              {"id": "b2", "userId": "8", "submissionId": "s1", "payload": {"value": "8"},
               "castAt": "2024-05-01T10:00:05Z"},
              {"id": "b3", "userId": "9", "submissionId": "s1", "payload": {},
               "castAt": "2024-05-01T10:00:09Z"}
            ]"#,
        );
        let bs = read_json_ballots(&path).unwrap();
        assert_eq!(bs.len(), 3);
        assert_eq!(
            bs[1].payload,
            RawPayload::Unrecognized(r#"{"value":"8"}"#.to_string())
        );
        assert_eq!(bs[2].payload, RawPayload::Unrecognized("{}".to_string()));

        let candidates: std::collections::HashSet<SubmissionId> =
            ["s1".to_string()].into_iter().collect();
        let ballots = normalize(&bs, Scheme::Simple, &candidates);
        assert!(ballots[0].counts());
        assert_eq!(ballots[1].reason, Some(ReasonCode::SchemeMismatch));
        let res = compute_results(&ballots, Scheme::Simple, &[], &EngineConfig::DEFAULT).unwrap();
        assert_eq!(res[0].score, 8.0);
        assert_eq!(res[0].vote_count, 1);
    }

    #[test]
    fn anonymous_entry_is_malformed() {
        let path = write_log(
            "ctally_io_json_anonymous.json",
            r#"[{"payload": {"value": 3}, "castAt": "2024-05-01T10:00:00Z"}]"#,
        );
        assert!(read_json_ballots(&path).is_err());
    }
}
