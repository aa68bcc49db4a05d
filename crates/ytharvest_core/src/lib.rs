//! Harvester core: the quota-aware, retrying harvest pipeline.
//!
//! Nothing in this crate performs IO on its own. The remote API and the
//! checkpoint store are reached through [`EntityFetcher`] and
//! [`CheckpointSink`], and every wait goes through a [`Clock`].
mod clock;
mod harvest;
mod ids;
mod outcome;
mod quota;
mod record;
mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use harvest::{
    CheckpointSink, EntityFetcher, HarvestConfig, HarvestError, HarvestSummary, Harvester,
};
pub use ids::identifiers;
pub use outcome::{EntityKind, FailureClass, FetchOutcome, Fetched, GivenUp, RetryOutcome};
pub use quota::{QuotaConfigError, QuotaSettings, QuotaState, QuotaTracker};
pub use record::{
    format_retrieved_on, ChannelRecord, Dataset, DatasetError, VideoRecord, RETRIEVED_ON_FORMAT,
};
pub use retry::{BackoffSchedule, HardFailurePolicy, RetryPolicy};
