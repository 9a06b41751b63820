use clap::Parser;

/// Tabulates the ballots of a competition and reports statistics and suspicious voting patterns.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The competition description in JSON format: scheme, candidates,
    /// ballot sources and settings. See the manual of the tally_engine crate for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, ctally checks that the
    /// computed summary matches it. Top-level sections absent from the reference are not compared.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the summary of the competition in JSON format.
    /// Defaults to the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) A ballot log. Setting this option replaces the ballot sources of the
    /// --config file.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default json) The type of the ballot log: json or csv.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// The voting scheme: simple, quadratic, ranked or approval. Overrides the scheme of the
    /// --config file, and is required without it.
    #[clap(short, long, value_parser)]
    pub scheme: Option<String>,

    /// (list of comma-separated values or not specified) The statistics categories to compute.
    /// All of them by default.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub categories: Option<Vec<String>>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
