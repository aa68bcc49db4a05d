use tokio::runtime::{Builder, Runtime};
use ytharvest_core::{EntityFetcher, EntityKind, FetchOutcome, Fetched};
use ytharvest_logging::harvest_debug;

use crate::{FailureKind, FetchError, YouTubeClient};

/// Synchronous [`EntityFetcher`] over [`YouTubeClient`].
///
/// Owns a current-thread runtime and blocks on one request at a time, which
/// is all the harvest loop ever issues.
pub struct BlockingFetcher {
    client: YouTubeClient,
    runtime: Runtime,
}

impl BlockingFetcher {
    pub fn new(client: YouTubeClient) -> Result<Self, FetchError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, runtime })
    }
}

impl EntityFetcher for BlockingFetcher {
    fn fetch(&mut self, kind: EntityKind, id: &str) -> Fetched {
        let outcome = match self.runtime.block_on(self.client.request(kind, id)) {
            Ok(payload) => {
                harvest_debug!("Fetched {} {}", kind, id);
                FetchOutcome::Success(payload)
            }
            Err(err) => err.into(),
        };
        Fetched::priced(kind, outcome)
    }
}
