use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use ytharvest_core::{
    identifiers, CheckpointSink, Dataset, DatasetError, EntityFetcher, EntityKind, FetchOutcome, Fetched,
    HarvestConfig, HarvestError, Harvester, ManualClock, QuotaSettings,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(ytharvest_logging::initialize_for_tests);
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Scripted API: known videos map to channels, listed entities always fail.
#[derive(Default)]
struct FakeApi {
    videos: HashMap<String, String>,
    failing: HashSet<(EntityKind, String)>,
    calls: Vec<(EntityKind, String)>,
    /// Cost returned since the last checkpoint, shared with the sink.
    spent: Rc<Cell<u64>>,
    /// Largest `spent + margin` observed right before a request.
    budget_check: Option<(u64, u64)>,
    checked_requests: usize,
}

impl FakeApi {
    fn with_videos(pairs: &[(&str, &str)]) -> Self {
        Self {
            videos: pairs
                .iter()
                .map(|(video, channel)| (video.to_string(), channel.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    fn failing(mut self, kind: EntityKind, id: &str) -> Self {
        self.failing.insert((kind, id.to_string()));
        self
    }

    fn calls_for(&self, kind: EntityKind, id: &str) -> usize {
        self.calls
            .iter()
            .filter(|(k, i)| *k == kind && i == id)
            .count()
    }
}

impl EntityFetcher for FakeApi {
    fn fetch(&mut self, kind: EntityKind, id: &str) -> Fetched {
        if let Some((budget, margin)) = self.budget_check {
            assert!(
                self.spent.get() + margin < budget,
                "request issued with {} spent against budget {budget}",
                self.spent.get()
            );
            self.checked_requests += 1;
        }
        self.calls.push((kind, id.to_string()));
        if self.failing.contains(&(kind, id.to_string())) {
            return Fetched::priced(kind, FetchOutcome::soft("connection reset by peer"));
        }
        let outcome = match kind {
            EntityKind::Video => match self.videos.get(id) {
                Some(channel) => FetchOutcome::Success(object(json!({
                    "kind": "youtube#video",
                    "id": id,
                    "snippet": {"channelId": channel, "title": format!("title of {id}")},
                }))),
                None => FetchOutcome::hard("no items returned"),
            },
            EntityKind::Channel => FetchOutcome::Success(object(json!({
                "kind": "youtube#channel",
                "id": id,
                "snippet": {"title": format!("channel {id}")},
            }))),
        };
        if matches!(outcome, FetchOutcome::Success(_)) {
            self.spent.set(self.spent.get() + kind.cost());
        }
        Fetched::priced(kind, outcome)
    }
}

#[derive(Default)]
struct MemorySink {
    saves: Vec<String>,
    spent: Rc<Cell<u64>>,
    fail: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("disk full")]
struct DiskFull;

impl CheckpointSink for MemorySink {
    type Error = DiskFull;

    fn save(&mut self, dataset: &Dataset) -> Result<(), DiskFull> {
        if self.fail {
            return Err(DiskFull);
        }
        self.saves.push(dataset.to_pretty_json().expect("serialize"));
        self.spent.set(0);
        Ok(())
    }
}

fn video_ids(dataset: &Dataset, channel_id: &str) -> Vec<String> {
    dataset
        .channel(channel_id)
        .expect("channel present")
        .videos()
        .iter()
        .map(|video| video.id().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn videos_of_one_channel_share_a_single_channel_fetch() {
    init_logging();
    let mut api = FakeApi::with_videos(&[("v1", "c1"), ("v2", "c1")]);
    let mut sink = MemorySink::default();
    let clock = ManualClock::new();
    let mut dataset = Dataset::new();

    let summary = Harvester::new(&mut api, &mut sink, &clock, HarvestConfig::default())
        .unwrap()
        .run(identifiers(["v1 v2"]), &mut dataset)
        .unwrap();

    assert_eq!(dataset.channel_ids().collect::<Vec<_>>(), vec!["c1"]);
    assert_eq!(video_ids(&dataset, "c1"), vec!["v1", "v2"]);
    assert_eq!(api.calls_for(EntityKind::Channel, "c1"), 1);
    assert_eq!(summary.videos_harvested, 2);
    assert_eq!(summary.channels_fetched, 1);
    assert!(sink.saves.is_empty());

    let channel = dataset.channel("c1").unwrap();
    assert_eq!(channel.retrieved_on(), Some("1970-01-01T00:00:00"));
    assert_eq!(
        channel.videos()[0].retrieved_on(),
        Some("1970-01-01T00:00:00")
    );
}

#[test]
fn video_that_never_succeeds_is_skipped_without_channel_side_effects() {
    init_logging();
    let mut api = FakeApi::with_videos(&[("v1", "c1")]).failing(EntityKind::Video, "v1");
    let mut sink = MemorySink::default();
    let clock = ManualClock::new();
    let mut dataset = Dataset::new();

    let summary = Harvester::new(&mut api, &mut sink, &clock, HarvestConfig::default())
        .unwrap()
        .run(identifiers(["v1"]), &mut dataset)
        .unwrap();

    assert!(dataset.is_empty());
    assert_eq!(api.calls_for(EntityKind::Video, "v1"), 7);
    assert_eq!(api.calls_for(EntityKind::Channel, "c1"), 0);
    assert_eq!(summary.videos_skipped, 1);
    assert_eq!(clock.total_slept(), Duration::from_secs(5 * 60 + 10 * 60));
}

#[test]
fn channel_that_never_succeeds_becomes_a_placeholder() {
    init_logging();
    let mut api = FakeApi::with_videos(&[("v1", "c1"), ("v2", "c1")])
        .failing(EntityKind::Channel, "c1");
    let mut sink = MemorySink::default();
    let clock = ManualClock::new();
    let mut dataset = Dataset::new();

    let summary = Harvester::new(&mut api, &mut sink, &clock, HarvestConfig::default())
        .unwrap()
        .run(identifiers(["v1", "v2"]), &mut dataset)
        .unwrap();

    let channel = dataset.channel("c1").unwrap();
    assert!(channel.is_placeholder());
    assert!(channel.metadata().is_empty());
    assert_eq!(video_ids(&dataset, "c1"), vec!["v1", "v2"]);
    // The placeholder stops the second video from fetching the channel again.
    assert_eq!(api.calls_for(EntityKind::Channel, "c1"), 7);
    assert_eq!(summary.placeholder_channels, 1);
}

#[test]
fn checkpoint_happens_before_the_request_that_would_overshoot() {
    init_logging();
    let mut api = FakeApi::with_videos(&[("v1", "c1")]);
    let spent = api.spent.clone();
    let mut sink = MemorySink {
        spent,
        ..MemorySink::default()
    };
    let clock = ManualClock::new();
    let config = HarvestConfig {
        quota: QuotaSettings {
            // Video costs 10; 10 + 13 reaches the budget before the channel fetch.
            budget: 23,
            ..QuotaSettings::default()
        },
        ..HarvestConfig::default()
    };
    let mut dataset = Dataset::new();

    let mut harvester = Harvester::new(&mut api, &mut sink, &clock, config).unwrap();
    let summary = harvester.run(identifiers(["v1"]), &mut dataset).unwrap();
    let spent_after = harvester.quota().spent();
    drop(harvester);

    assert_eq!(summary.checkpoints, 1);
    assert_eq!(sink.saves, vec!["{}".to_string()]);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(24 * 3600 + 600)]);
    // Reset to zero after the wait, then charged for the channel only.
    assert_eq!(spent_after, EntityKind::Channel.cost());
    assert_eq!(
        api.calls,
        vec![
            (EntityKind::Video, "v1".to_string()),
            (EntityKind::Channel, "c1".to_string())
        ]
    );
    assert_eq!(video_ids(&dataset, "c1"), vec!["v1"]);
}

#[test]
fn spend_stays_below_budget_minus_margin_before_every_request() {
    init_logging();
    let pairs: Vec<(String, String)> = (0..60)
        .map(|n| (format!("v{n}"), format!("c{}", (n * 7) % 11)))
        .collect();
    let borrowed: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(v, c)| (v.as_str(), c.as_str()))
        .collect();
    let mut api = FakeApi::with_videos(&borrowed);
    let budget = 100;
    api.budget_check = Some((budget, QuotaSettings::default().safety_margin));
    let mut sink = MemorySink {
        spent: api.spent.clone(),
        ..MemorySink::default()
    };
    let clock = ManualClock::new();
    let config = HarvestConfig {
        quota: QuotaSettings {
            budget,
            ..QuotaSettings::default()
        },
        ..HarvestConfig::default()
    };
    let mut dataset = Dataset::new();

    let input: Vec<String> = pairs.iter().map(|(v, _)| v.clone()).collect();
    let summary = Harvester::new(&mut api, &mut sink, &clock, config)
        .unwrap()
        .run(input, &mut dataset)
        .unwrap();

    assert_eq!(api.checked_requests, 60 + 11);
    assert!(summary.checkpoints > 0);
    assert_eq!(sink.saves.len(), summary.checkpoints);
}

#[test]
fn output_has_unique_owned_channels_in_first_seen_order() {
    init_logging();
    // Deterministic pseudo-random assignment of videos to channels.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut pairs = Vec::new();
    for n in 0..200 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        pairs.push((format!("v{n}"), format!("c{}", (seed >> 33) % 17)));
    }
    let borrowed: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(v, c)| (v.as_str(), c.as_str()))
        .collect();
    let mut api = FakeApi::with_videos(&borrowed).failing(EntityKind::Video, "v13");
    let mut sink = MemorySink::default();
    let clock = ManualClock::new();
    let mut dataset = Dataset::new();

    let lines: Vec<String> = pairs
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .map(|(v, _)| v.as_str())
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect();
    Harvester::new(&mut api, &mut sink, &clock, HarvestConfig::default())
        .unwrap()
        .run(identifiers(lines), &mut dataset)
        .unwrap();

    let mut first_seen = Vec::new();
    for (video, channel) in &pairs {
        if video != "v13" && !first_seen.contains(channel) {
            first_seen.push(channel.clone());
        }
    }
    assert_eq!(dataset.channel_ids().collect::<Vec<_>>(), first_seen);
    for (channel_id, record) in dataset.iter() {
        assert_eq!(api.calls_for(EntityKind::Channel, channel_id), 1);
        for video in record.videos() {
            assert_eq!(video.channel_id(), Some(channel_id));
        }
    }
    assert_eq!(dataset.video_count(), 199);

    // Videos keep input order within their channel.
    let order: Vec<String> = dataset
        .iter()
        .flat_map(|(_, record)| record.videos().iter())
        .map(|video| video.id().unwrap().to_string())
        .collect();
    for (channel_id, _) in dataset.iter() {
        let expected: Vec<&String> = pairs
            .iter()
            .filter(|(v, c)| c == channel_id && v != "v13")
            .map(|(v, _)| v)
            .collect();
        let actual: Vec<&String> = order
            .iter()
            .filter(|v| pairs.iter().any(|(pv, pc)| pv == *v && pc == channel_id))
            .collect();
        assert_eq!(actual, expected);
    }
}

#[test]
fn known_channels_are_not_fetched_again() {
    init_logging();
    let mut api = FakeApi::with_videos(&[("v1", "c1"), ("v2", "c2")]);
    let mut sink = MemorySink::default();
    let clock = ManualClock::new();
    let mut dataset = Dataset::new();
    dataset.insert_channel("c1", ytharvest_core::ChannelRecord::placeholder());

    Harvester::new(&mut api, &mut sink, &clock, HarvestConfig::default())
        .unwrap()
        .run(identifiers(["v1 v2"]), &mut dataset)
        .unwrap();

    assert_eq!(api.calls_for(EntityKind::Channel, "c1"), 0);
    assert_eq!(api.calls_for(EntityKind::Channel, "c2"), 1);
    assert_eq!(dataset.channel_ids().collect::<Vec<_>>(), vec!["c1", "c2"]);
}

/// Fetcher that returns a video without an owner.
struct OwnerlessVideo;

impl EntityFetcher for OwnerlessVideo {
    fn fetch(&mut self, kind: EntityKind, id: &str) -> Fetched {
        Fetched::priced(kind, FetchOutcome::Success(object(json!({"id": id}))))
    }
}

#[test]
fn video_without_owner_aborts_after_checkpoint() {
    init_logging();
    let mut sink = MemorySink::default();
    let clock = ManualClock::new();
    let mut dataset = Dataset::new();
    dataset.insert_channel("c0", ytharvest_core::ChannelRecord::placeholder());

    let err = Harvester::new(OwnerlessVideo, &mut sink, &clock, HarvestConfig::default())
        .unwrap()
        .run(identifiers(["v1 v2"]), &mut dataset)
        .unwrap_err();

    assert!(matches!(err, HarvestError::MissingChannelId { ref video_id } if video_id == "v1"));
    assert_eq!(sink.saves.len(), 1);
    assert_eq!(dataset.len(), 1);
}

#[test]
fn checkpoint_failure_stops_before_sleeping() {
    init_logging();
    let mut api = FakeApi::with_videos(&[("v1", "c1"), ("v2", "c2")]);
    let mut sink = MemorySink {
        fail: true,
        ..MemorySink::default()
    };
    let clock = ManualClock::new();
    let config = HarvestConfig {
        quota: QuotaSettings {
            budget: 40,
            ..QuotaSettings::default()
        },
        ..HarvestConfig::default()
    };
    let mut dataset = Dataset::new();

    let mut harvester = Harvester::new(&mut api, &mut sink, &clock, config).unwrap();
    let err = harvester
        .run(identifiers(["v1 v2"]), &mut dataset)
        .unwrap_err();
    let summary = harvester.summary();
    drop(harvester);

    assert!(matches!(err, HarvestError::Checkpoint(_)));
    assert_eq!(err.to_string(), "checkpoint failed: disk full");
    // v1 and c1 cost 22; 22 + 13 < 40 lets v2 through, 32 + 13 blocks c2.
    assert_eq!(video_ids(&dataset, "c1"), vec!["v1"]);
    assert!(!dataset.contains_channel("c2"));
    assert_eq!(summary.identifiers, 2);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn merge_failure_surfaces_as_harvest_error() {
    let err = HarvestError::from(DatasetError::UnknownChannel {
        channel_id: "c9".into(),
    });

    assert!(matches!(
        err,
        HarvestError::Merge(DatasetError::UnknownChannel { ref channel_id }) if channel_id == "c9"
    ));
    assert_eq!(
        err.to_string(),
        "could not merge video: channel c9 is not in the dataset"
    );
}
