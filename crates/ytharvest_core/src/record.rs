use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// `strftime` layout of the `retrieved_on` annotation.
pub const RETRIEVED_ON_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const RETRIEVED_ON_KEY: &str = "retrieved_on";

pub fn format_retrieved_on(at: NaiveDateTime) -> String {
    at.format(RETRIEVED_ON_FORMAT).to_string()
}

/// A video document as returned by the API, plus its retrieval stamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoRecord {
    fields: Map<String, Value>,
}

impl VideoRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// Owning channel, read from `snippet.channelId`.
    pub fn channel_id(&self) -> Option<&str> {
        self.fields
            .get("snippet")
            .and_then(|snippet| snippet.get("channelId"))
            .and_then(Value::as_str)
    }

    pub fn retrieved_on(&self) -> Option<&str> {
        self.fields.get(RETRIEVED_ON_KEY).and_then(Value::as_str)
    }

    pub fn stamp_retrieved_on(&mut self, at: NaiveDateTime) {
        self.fields.insert(
            RETRIEVED_ON_KEY.to_string(),
            Value::String(format_retrieved_on(at)),
        );
    }
}

/// A channel document and the videos discovered for it, in discovery order.
///
/// A placeholder has empty metadata: its fetch gave up, and the entry only
/// exists so later videos of the same channel do not trigger another fetch.
/// It serializes exactly like a fetched record that has no fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelRecord {
    #[serde(flatten)]
    metadata: Map<String, Value>,
    #[serde(default)]
    videos: Vec<VideoRecord>,
}

impl ChannelRecord {
    pub fn fetched(mut metadata: Map<String, Value>, retrieved_on: NaiveDateTime) -> Self {
        // The flattened metadata must not shadow the video list.
        metadata.remove("videos");
        metadata.insert(
            RETRIEVED_ON_KEY.to_string(),
            Value::String(format_retrieved_on(retrieved_on)),
        );
        Self {
            metadata,
            videos: Vec::new(),
        }
    }

    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn is_placeholder(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn retrieved_on(&self) -> Option<&str> {
        self.metadata.get(RETRIEVED_ON_KEY).and_then(Value::as_str)
    }

    pub fn videos(&self) -> &[VideoRecord] {
        &self.videos
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    #[error("video {video_id} has no owning channel id")]
    MissingChannelId { video_id: String },
    #[error("channel {channel_id} is not in the dataset")]
    UnknownChannel { channel_id: String },
}

/// Channel id to channel record, in first-seen order.
///
/// Videos can only be added under the channel they name as owner, so every
/// key holds exactly the videos it owns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    channels: Vec<(String, ChannelRecord)>,
    index: HashMap<String, usize>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains_channel(&self, channel_id: &str) -> bool {
        self.index.contains_key(channel_id)
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelRecord> {
        self.index
            .get(channel_id)
            .map(|&slot| &self.channels[slot].1)
    }

    /// Insert a channel under `channel_id`. An existing entry is never
    /// replaced; returns `false` in that case.
    pub fn insert_channel(&mut self, channel_id: impl Into<String>, record: ChannelRecord) -> bool {
        let channel_id = channel_id.into();
        if self.index.contains_key(&channel_id) {
            return false;
        }
        self.index.insert(channel_id.clone(), self.channels.len());
        self.channels.push((channel_id, record));
        true
    }

    /// Append a video to the list of the channel that owns it.
    pub fn push_video(&mut self, video: VideoRecord) -> Result<(), DatasetError> {
        let Some(channel_id) = video.channel_id() else {
            return Err(DatasetError::MissingChannelId {
                video_id: video.id().unwrap_or_default().to_string(),
            });
        };
        let Some(&slot) = self.index.get(channel_id) else {
            return Err(DatasetError::UnknownChannel {
                channel_id: channel_id.to_string(),
            });
        };
        self.channels[slot].1.videos.push(video);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelRecord)> {
        self.channels
            .iter()
            .map(|(channel_id, record)| (channel_id.as_str(), record))
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(channel_id, _)| channel_id.as_str())
    }

    pub fn video_count(&self) -> usize {
        self.channels
            .iter()
            .map(|(_, record)| record.videos.len())
            .sum()
    }

    /// Human-readable JSON with four-space indentation.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        // serde_json only ever emits valid UTF-8.
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.channels.len()))?;
        for (channel_id, record) in &self.channels {
            map.serialize_entry(channel_id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DatasetVisitor)
    }
}

struct DatasetVisitor;

impl<'de> Visitor<'de> for DatasetVisitor {
    type Value = Dataset;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of channel id to channel record")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Dataset, A::Error> {
        let mut dataset = Dataset::new();
        while let Some((channel_id, record)) = access.next_entry::<String, ChannelRecord>()? {
            if !dataset.insert_channel(channel_id.clone(), record) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate channel id {channel_id}"
                )));
            }
        }
        Ok(dataset)
    }
}
