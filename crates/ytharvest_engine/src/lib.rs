//! Harvester engine: YouTube Data API adapter and checkpoint storage.
mod blocking;
mod fetch;
mod persist;
mod types;

pub use blocking::BlockingFetcher;
pub use fetch::{ApiSettings, YouTubeClient, CHANNEL_PARTS, VIDEO_PARTS};
pub use persist::{ensure_output_dir, load_checkpoint, AtomicFileWriter, JsonCheckpoint, PersistError};
pub use types::{FailureKind, FetchError};
