//! Harvest orchestrator.
//!
//! Each identifier is processed to completion before the next one is pulled:
//!
//! ```text
//! quota gate -> fetch video -> (gave up) skip
//!                          \-> stamp, charge -> channel known? -> append video
//!                                           \-> quota gate -> fetch channel
//!                                               (gave up -> placeholder) -> append video
//! ```
//!
//! There is one outstanding request at a time, and one spend counter.

use std::error::Error as StdError;

use thiserror::Error;
use ytharvest_logging::{harvest_debug, harvest_error, harvest_info, harvest_warn};

use crate::clock::Clock;
use crate::outcome::{EntityKind, Fetched, RetryOutcome};
use crate::quota::{QuotaConfigError, QuotaSettings, QuotaTracker};
use crate::record::{ChannelRecord, Dataset, DatasetError, VideoRecord};
use crate::retry::RetryPolicy;

/// One read call against the remote API.
pub trait EntityFetcher {
    fn fetch(&mut self, kind: EntityKind, id: &str) -> Fetched;
}

impl<T: EntityFetcher + ?Sized> EntityFetcher for &mut T {
    fn fetch(&mut self, kind: EntityKind, id: &str) -> Fetched {
        (**self).fetch(kind, id)
    }
}

/// Durable store for the in-progress dataset. Each save replaces the last.
pub trait CheckpointSink {
    type Error: StdError + Send + Sync + 'static;

    fn save(&mut self, dataset: &Dataset) -> Result<(), Self::Error>;
}

impl<T: CheckpointSink + ?Sized> CheckpointSink for &mut T {
    type Error = T::Error;

    fn save(&mut self, dataset: &Dataset) -> Result<(), Self::Error> {
        (**self).save(dataset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestConfig {
    pub retry: RetryPolicy,
    pub quota: QuotaSettings,
}

/// Errors that stop the harvest. The dataset stays with the caller.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[source] Box<dyn StdError + Send + Sync>),
    #[error("video {video_id} has no owning channel id (snippet.channelId)")]
    MissingChannelId { video_id: String },
    #[error("could not merge video: {0}")]
    Merge(#[from] DatasetError),
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestSummary {
    pub identifiers: usize,
    pub videos_harvested: usize,
    pub videos_skipped: usize,
    pub channels_fetched: usize,
    pub placeholder_channels: usize,
    pub checkpoints: usize,
}

pub struct Harvester<F, S, C> {
    fetcher: F,
    sink: S,
    clock: C,
    retry: RetryPolicy,
    quota: QuotaTracker,
    summary: HarvestSummary,
}

impl<F, S, C> Harvester<F, S, C>
where
    F: EntityFetcher,
    S: CheckpointSink,
    C: Clock,
{
    pub fn new(fetcher: F, sink: S, clock: C, config: HarvestConfig) -> Result<Self, QuotaConfigError> {
        Ok(Self {
            fetcher,
            sink,
            clock,
            retry: config.retry,
            quota: QuotaTracker::new(config.quota)?,
            summary: HarvestSummary::default(),
        })
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Counters of the current or last run, also after a failed run.
    pub fn summary(&self) -> HarvestSummary {
        self.summary
    }

    /// Harvest every identifier into `dataset`, in input order.
    ///
    /// Channels already present in `dataset` are not fetched again. On error
    /// `dataset` holds everything merged so far.
    pub fn run<I>(&mut self, ids: I, dataset: &mut Dataset) -> Result<HarvestSummary, HarvestError>
    where
        I: IntoIterator<Item = String>,
    {
        self.summary = HarvestSummary::default();
        for id in ids {
            self.summary.identifiers += 1;
            self.process(&id, dataset)?;
        }
        harvest_info!(
            "Harvest finished: {} identifier(s), {} video(s), {} skipped, {} channel(s) fetched, {} placeholder(s), {} checkpoint(s)",
            self.summary.identifiers,
            self.summary.videos_harvested,
            self.summary.videos_skipped,
            self.summary.channels_fetched,
            self.summary.placeholder_channels,
            self.summary.checkpoints
        );
        Ok(self.summary)
    }

    fn process(&mut self, video_id: &str, dataset: &mut Dataset) -> Result<(), HarvestError> {
        self.ensure_budget(dataset)?;
        let mut video = match self.fetch(EntityKind::Video, video_id) {
            RetryOutcome::Success { payload, cost, .. } => {
                self.quota.charge(cost);
                VideoRecord::new(payload)
            }
            RetryOutcome::GivenUp(given_up) => {
                harvest_warn!("Failed retrieving video {}: {}", video_id, given_up);
                self.summary.videos_skipped += 1;
                return Ok(());
            }
        };
        video.stamp_retrieved_on(self.clock.now());

        let Some(channel_id) = video.channel_id().map(str::to_owned) else {
            harvest_error!("Video {} has no snippet.channelId; aborting harvest", video_id);
            if let Err(err) = self.sink.save(dataset) {
                harvest_error!("Checkpoint before abort failed: {}", err);
            }
            return Err(HarvestError::MissingChannelId {
                video_id: video_id.to_string(),
            });
        };

        if !dataset.contains_channel(&channel_id) {
            self.ensure_budget(dataset)?;
            let record = match self.fetch(EntityKind::Channel, &channel_id) {
                RetryOutcome::Success { payload, cost, .. } => {
                    self.quota.charge(cost);
                    self.summary.channels_fetched += 1;
                    ChannelRecord::fetched(payload, self.clock.now())
                }
                RetryOutcome::GivenUp(given_up) => {
                    harvest_warn!("Failed retrieving channel {}: {}", channel_id, given_up);
                    self.summary.placeholder_channels += 1;
                    ChannelRecord::placeholder()
                }
            };
            dataset.insert_channel(channel_id.clone(), record);
        }

        // The owner id was checked above and its channel is now present.
        dataset.push_video(video)?;
        self.summary.videos_harvested += 1;
        harvest_debug!(
            "Merged video {} into channel {} (quota spent {})",
            video_id,
            channel_id,
            self.quota.spent()
        );
        Ok(())
    }

    fn fetch(&mut self, kind: EntityKind, id: &str) -> RetryOutcome {
        let fetcher = &mut self.fetcher;
        self.retry
            .run(kind, id, &self.clock, || fetcher.fetch(kind, id))
    }

    /// Checkpoint and wait out the quota window if the next request could
    /// overshoot the budget.
    fn ensure_budget(&mut self, dataset: &Dataset) -> Result<(), HarvestError> {
        if !self.quota.should_checkpoint() {
            return Ok(());
        }
        let state = self.quota.state();
        harvest_info!(
            "Quota nearly exhausted ({} of {} spent); checkpointing {} channel(s)",
            state.spent,
            state.budget,
            dataset.len()
        );
        self.sink
            .save(dataset)
            .map_err(|err| HarvestError::Checkpoint(Box::new(err)))?;
        self.summary.checkpoints += 1;

        let wait = self.quota.reset_wait();
        harvest_info!("Sleeping {:?} until the quota resets", wait);
        self.clock.sleep(wait);
        self.quota.reset();
        harvest_info!("Quota reset; resuming harvest");
        Ok(())
    }
}
