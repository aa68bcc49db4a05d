use std::fmt;

use serde_json::{Map, Value};

/// The two entity kinds the harvester reads from the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Video,
    Channel,
}

impl EntityKind {
    /// Quota units charged for one request of this kind.
    ///
    /// The published price is one base unit plus two per requested part
    /// (four parts for videos, five for channels). One extra unit is added so
    /// the tracker always over-estimates.
    pub const fn cost(self) -> u64 {
        match self {
            EntityKind::Video => 10,
            EntityKind::Channel => 12,
        }
    }

    /// Cost of the most expensive single request.
    pub const fn max_cost() -> u64 {
        let video = EntityKind::Video.cost();
        let channel = EntityKind::Channel.cost();
        if video > channel {
            video
        } else {
            channel
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Video => "video",
            EntityKind::Channel => "channel",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failed call failed in transport or at the protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network-level error: the request never produced a usable response.
    Soft,
    /// The service answered, but with an error or without the entity.
    Hard,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Soft => write!(f, "transport failure"),
            FailureClass::Hard => write!(f, "protocol failure"),
        }
    }
}

/// Result of a single API call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The canonical record for the requested id, without response envelope.
    Success(Map<String, Value>),
    SoftFailure(String),
    HardFailure(String),
}

impl FetchOutcome {
    pub fn soft(reason: impl Into<String>) -> Self {
        FetchOutcome::SoftFailure(reason.into())
    }

    pub fn hard(reason: impl Into<String>) -> Self {
        FetchOutcome::HardFailure(reason.into())
    }
}

/// A call outcome together with the quota it consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub outcome: FetchOutcome,
    pub cost: u64,
}

impl Fetched {
    /// Outcome priced at the static cost of `kind`.
    pub fn priced(kind: EntityKind, outcome: FetchOutcome) -> Self {
        Self {
            outcome,
            cost: kind.cost(),
        }
    }
}

/// Result of a retry-controlled fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Success {
        payload: Map<String, Value>,
        cost: u64,
        attempts: u32,
    },
    GivenUp(GivenUp),
}

/// Diagnostics for a fetch that exhausted its retry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GivenUp {
    pub kind: EntityKind,
    pub id: String,
    pub attempts: u32,
    pub class: FailureClass,
    pub reason: String,
}

impl fmt::Display for GivenUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up on {} {} after {} attempt(s), last {}: {}",
            self.kind, self.id, self.attempts, self.class, self.reason
        )
    }
}
