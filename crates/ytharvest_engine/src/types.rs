use std::fmt;

use ytharvest_core::{FailureClass, FetchOutcome};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Network,
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    HttpStatus(u16),
    /// Error document returned by the API, with its first `reason`.
    Api { status: u16, reason: String },
    Decode,
    /// The API answered but listed no item for the id.
    NotFound,
}

impl FailureKind {
    /// Transport problems are soft; anything the service said is hard.
    pub fn class(&self) -> FailureClass {
        match self {
            FailureKind::Network | FailureKind::Timeout | FailureKind::TooLarge { .. } => {
                FailureClass::Soft
            }
            FailureKind::InvalidUrl
            | FailureKind::HttpStatus(_)
            | FailureKind::Api { .. }
            | FailureKind::Decode
            | FailureKind::NotFound => FailureClass::Hard,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Api { status, reason } => write!(f, "api error {status} ({reason})"),
            FailureKind::Decode => write!(f, "undecodable response"),
            FailureKind::NotFound => write!(f, "no items returned"),
        }
    }
}

impl From<FetchError> for FetchOutcome {
    fn from(err: FetchError) -> Self {
        match err.kind.class() {
            FailureClass::Soft => FetchOutcome::SoftFailure(err.to_string()),
            FailureClass::Hard => FetchOutcome::HardFailure(err.to_string()),
        }
    }
}
