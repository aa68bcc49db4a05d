use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use url::Url;
use ytharvest_core::EntityKind;
use ytharvest_logging::harvest_trace;

use crate::{FailureKind, FetchError};

/// Parts requested for a video: basic details, content details, statistics
/// and topics.
pub const VIDEO_PARTS: &str = "snippet,contentDetails,statistics,topicDetails";

/// Parts requested for a channel: as for videos, plus branding settings.
pub const CHANNEL_PARTS: &str = "snippet,contentDetails,statistics,topicDetails,brandingSettings";

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Async client for the `videos.list` and `channels.list` endpoints.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    settings: ApiSettings,
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeClient {
    pub fn new(settings: ApiSettings, api_key: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            api_key: api_key.into(),
            client,
        })
    }

    /// Full request URL for `id`, including the API key.
    pub fn request_url(&self, kind: EntityKind, id: &str) -> Result<Url, FetchError> {
        let (endpoint, parts) = match kind {
            EntityKind::Video => ("videos", VIDEO_PARTS),
            EntityKind::Channel => ("channels", CHANNEL_PARTS),
        };
        let base = self.settings.base_url.trim_end_matches('/');
        Url::parse_with_params(
            &format!("{base}/{endpoint}"),
            &[("part", parts), ("id", id), ("key", self.api_key.as_str())],
        )
        .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    /// Fetch the single record for `id`, stripped of the list envelope.
    pub async fn request(&self, kind: EntityKind, id: &str) -> Result<Map<String, Value>, FetchError> {
        let url = self.request_url(kind, id)?;
        harvest_trace!("GET {} {}", kind, id);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let bytes = self.read_body(response).await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &bytes));
        }

        let document: Value = serde_json::from_slice(&bytes)
            .map_err(|err| FetchError::new(FailureKind::Decode, err.to_string()))?;
        first_item(document, id)
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

fn first_item(document: Value, id: &str) -> Result<Map<String, Value>, FetchError> {
    let Value::Object(mut envelope) = document else {
        return Err(FetchError::new(FailureKind::Decode, "response is not an object"));
    };
    let items = match envelope.remove("items") {
        Some(Value::Array(items)) => items,
        // The API omits `items` entirely when nothing matched.
        None => Vec::new(),
        Some(_) => {
            return Err(FetchError::new(FailureKind::Decode, "`items` is not an array"));
        }
    };
    match items.into_iter().next() {
        Some(Value::Object(item)) => Ok(item),
        Some(_) => Err(FetchError::new(FailureKind::Decode, "item is not an object")),
        None => Err(FetchError::new(
            FailureKind::NotFound,
            format!("no items for id {id}"),
        )),
    }
}

/// Build the error for a non-2xx answer, using the API error document when
/// there is one: `{"error": {"message": .., "errors": [{"reason": ..}]}}`.
fn api_error(status: u16, body: &[u8]) -> FetchError {
    let Ok(document) = serde_json::from_slice::<Value>(body) else {
        return FetchError::new(FailureKind::HttpStatus(status), format!("http status {status}"));
    };
    let Some(error) = document.get("error") else {
        return FetchError::new(FailureKind::HttpStatus(status), format!("http status {status}"));
    };
    let reason = error
        .get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    FetchError::new(FailureKind::Api { status, reason }, message)
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    // The request URL carries the API key.
    let err = err.without_url();
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
