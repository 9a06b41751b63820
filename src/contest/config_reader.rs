use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tally_engine::*;

use crate::contest::{ConfigurationSnafu, ContestResult};

/// A ballot log to read.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotSource {
    /// `json` or `csv`
    pub provider: String,
    /// Relative paths are resolved against the directory of the competition file.
    pub file_path: String,
}

/// The description of a competition, as found in the JSON competition file.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestConfig {
    pub name: String,
    pub scheme: String,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub ballot_sources: Vec<BallotSource>,
    #[serde(default)]
    pub settings: EngineConfig,
    /// `user:<id>` or `session:<id>` to the group the voter declared.
    #[serde(default)]
    pub affiliations: BTreeMap<String, String>,
    pub categories: Option<Vec<String>>,
}

impl ContestConfig {
    pub fn new(name: &str, scheme: &str) -> ContestConfig {
        ContestConfig {
            name: name.to_string(),
            scheme: scheme.to_string(),
            candidates: Vec::new(),
            ballot_sources: Vec::new(),
            settings: EngineConfig::DEFAULT,
            affiliations: BTreeMap::new(),
            categories: None,
        }
    }

    pub fn scheme(&self) -> ContestResult<Scheme> {
        self.scheme
            .parse::<Scheme>()
            .context(ConfigurationSnafu {})
    }

    pub fn categories(&self) -> ContestResult<Option<Vec<StatCategory>>> {
        match &self.categories {
            None => Ok(None),
            Some(names) => {
                let cs: Result<Vec<StatCategory>, ConfigurationError> =
                    names.iter().map(|n| n.parse::<StatCategory>()).collect();
                Ok(Some(cs.context(ConfigurationSnafu {})?))
            }
        }
    }

    pub fn affiliations(&self) -> ContestResult<HashMap<VoterKey, String>> {
        let mut res: HashMap<VoterKey, String> = HashMap::new();
        for (key, group) in self.affiliations.iter() {
            let voter = key.parse::<VoterKey>().context(ConfigurationSnafu {})?;
            res.insert(voter, group.clone());
        }
        Ok(res)
    }
}
