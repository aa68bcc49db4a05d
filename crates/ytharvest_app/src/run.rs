use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use ytharvest_core::{
    identifiers, CheckpointSink, Clock, Dataset, EntityFetcher, HarvestError, HarvestSummary,
    Harvester, SystemClock,
};
use ytharvest_engine::{load_checkpoint, BlockingFetcher, JsonCheckpoint, YouTubeClient};
use ytharvest_logging::{harvest_info, harvest_warn};

use crate::config::Settings;
use crate::credentials::read_api_key;

/// How a harvest ended. The dataset is printed either way.
#[derive(Debug)]
pub enum Completion {
    Finished(HarvestSummary),
    Aborted(HarvestError),
    /// Reading identifiers failed; everything read before the error was harvested.
    InputFailed {
        summary: HarvestSummary,
        error: io::Error,
    },
}

/// Wire the real API, checkpoint file and system clock to stdin and stdout.
pub fn run(settings: &Settings) -> Result<Completion> {
    let api_key = read_api_key(&settings.key_file)?;
    let client = YouTubeClient::new(settings.api.clone(), api_key)
        .context("building the API client")?;
    let fetcher = BlockingFetcher::new(client).context("starting the request runtime")?;
    let checkpoint = JsonCheckpoint::new(&settings.checkpoint)?;

    let mut dataset = if settings.resume {
        load_checkpoint(&settings.checkpoint).with_context(|| {
            format!("resuming from checkpoint {}", settings.checkpoint.display())
        })?
    } else {
        Dataset::new()
    };
    harvest_info!(
        "Starting harvest with {} known channel(s); checkpoint at {}",
        dataset.len(),
        settings.checkpoint.display()
    );

    let harvester = Harvester::new(fetcher, checkpoint, SystemClock, settings.harvest)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    harvest_and_emit(harvester, stdin.lock(), &mut dataset, &mut stdout.lock())
}

/// Harvest every id read from `input`, then write the dataset to `output`,
/// also when the harvest stopped early.
pub fn harvest_and_emit<F, S, C, R, W>(
    mut harvester: Harvester<F, S, C>,
    input: R,
    dataset: &mut Dataset,
    output: &mut W,
) -> Result<Completion>
where
    F: EntityFetcher,
    S: CheckpointSink,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let mut read_error = None;
    let lines = input
        .split(b'\n')
        .enumerate()
        .map_while(|(index, line)| match line {
            Ok(bytes) => Some((index + 1, bytes)),
            Err(err) => {
                read_error = Some(err);
                None
            }
        })
        .filter_map(|(number, bytes)| match String::from_utf8(bytes) {
            Ok(line) => Some(line),
            Err(_) => {
                harvest_warn!("Skipping input line {}: not valid UTF-8", number);
                None
            }
        });

    let completion = match (harvester.run(identifiers(lines), dataset), read_error) {
        (Err(err), _) => Completion::Aborted(err),
        (Ok(summary), Some(error)) => Completion::InputFailed { summary, error },
        (Ok(summary), None) => Completion::Finished(summary),
    };

    let json = dataset.to_pretty_json().context("serializing dataset")?;
    writeln!(output, "{json}").context("writing dataset to stdout")?;
    output.flush().context("flushing stdout")?;
    Ok(completion)
}
