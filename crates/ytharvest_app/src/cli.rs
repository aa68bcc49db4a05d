use std::path::PathBuf;

use clap::Parser;

/// Harvest YouTube video and channel metadata.
///
/// Reads whitespace-separated video ids from stdin and prints a JSON object
/// mapping each owning channel id to its channel record, with the channel's
/// videos nested under `videos`.
#[derive(Debug, Parser)]
#[command(name = "ytharvest", version)]
pub struct Cli {
    /// RON configuration file. Flags given here override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File holding the API developer key as its first token.
    #[arg(long, value_name = "FILE")]
    pub key_file: Option<PathBuf>,

    /// Where the dataset is checkpointed before quota waits.
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Start from the existing checkpoint instead of an empty dataset.
    #[arg(long)]
    pub resume: bool,

    /// Also write logs to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    /// Give up on an id at the first API error instead of retrying it.
    #[arg(long)]
    pub no_retry_api_errors: bool,
}
