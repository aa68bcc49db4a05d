//! `ytharvest`: harvest YouTube video and channel metadata from ids on stdin.
mod cli;
mod config;
mod credentials;
mod run;

use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use ytharvest_logging::{harvest_error, harvest_info, LogDestination};

use crate::cli::Cli;
use crate::config::Settings;
use crate::run::Completion;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::resolve(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("ytharvest: {err:#}");
            return ExitCode::from(2);
        }
    };

    let level = if settings.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match &settings.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    ytharvest_logging::initialize(destination, level);

    match run::run(&settings) {
        Ok(Completion::Finished(summary)) => {
            harvest_info!(
                "Done: {} video(s) across {} new channel(s)",
                summary.videos_harvested,
                summary.channels_fetched + summary.placeholder_channels
            );
            ExitCode::SUCCESS
        }
        Ok(Completion::Aborted(err)) => {
            harvest_error!("Harvest aborted, partial dataset printed: {}", err);
            ExitCode::from(1)
        }
        Ok(Completion::InputFailed { summary, error }) => {
            harvest_error!(
                "Reading identifiers failed after {} video(s), partial dataset printed: {}",
                summary.videos_harvested,
                error
            );
            ExitCode::from(1)
        }
        Err(err) => {
            harvest_error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}
