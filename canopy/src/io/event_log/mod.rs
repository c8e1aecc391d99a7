//! Event log contract and reference implementations.
//!
//! The log is append-only: events are never mutated or deleted. Appends are
//! all-or-nothing per batch and may carry a compare-and-swap precondition that
//! is evaluated against a filtered read immediately before commit.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::event::{Event, EventId};
use crate::core::query::{EventQuery, QueryError};

mod jsonl;
mod memory;

pub use jsonl::JsonlEventLog;
pub use memory::InMemoryEventLog;

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The CAS predicate rejected the append. Never retried by the engine.
    #[error("append conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    InvalidQuery(#[from] QueryError),
    #[error("duplicate event id {0}")]
    DuplicateId(EventId),
    #[error("event log is stopped")]
    Stopped,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CasPredicate = Arc<dyn Fn(&[Event]) -> bool + Send + Sync>;

/// Optimistic-concurrency precondition for an append.
#[derive(Clone)]
pub struct Cas {
    pub query: EventQuery,
    pub predicate: CasPredicate,
}

impl Cas {
    pub fn new<F>(query: EventQuery, predicate: F) -> Self
    where
        F: Fn(&[Event]) -> bool + Send + Sync + 'static,
    {
        Self {
            query,
            predicate: Arc::new(predicate),
        }
    }

    /// Commit only if nothing matches `query` yet.
    pub fn expect_none(query: EventQuery) -> Self {
        Self::new(query, <[Event]>::is_empty)
    }

    /// Commit only if the newest matching event is `expected` (or none when `None`).
    pub fn expect_last(query: EventQuery, expected: Option<EventId>) -> Self {
        Self::new(query, move |events| {
            events.last().map(|event| event.id) == expected
        })
    }

    pub(crate) fn evaluate<'a, I>(&self, prior: I) -> Result<(), EventLogError>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let matching: Vec<Event> = prior
            .into_iter()
            .filter(|event| self.query.matches(event))
            .cloned()
            .collect();
        if (self.predicate)(&matching) {
            return Ok(());
        }
        Err(EventLogError::Conflict(format!(
            "precondition rejected against {} matching event(s)",
            matching.len()
        )))
    }
}

impl fmt::Debug for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cas")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// One atomic append.
#[derive(Debug, Clone, Default)]
pub struct AppendRequest {
    pub events: Vec<Event>,
    pub tx_metadata: Option<Map<String, Value>>,
    pub cas: Option<Cas>,
}

impl AppendRequest {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tx_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.tx_metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_cas(mut self, cas: Cas) -> Self {
        self.cas = Some(cas);
        self
    }

    fn validate(&self) -> Result<(), EventLogError> {
        if let Some(cas) = &self.cas {
            cas.query.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for event in &self.events {
            if !seen.insert(event.id) {
                return Err(EventLogError::DuplicateId(event.id));
            }
        }
        Ok(())
    }
}

/// An event as stored, with the metadata of the transaction that appended it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<Map<String, Value>>,
}

/// Lazy, ordered read result. Each call to `read` starts a fresh stream.
pub type EventStream<'a> = Box<dyn Iterator<Item = Result<Event, EventLogError>> + Send + 'a>;

/// Durable history collaborator.
pub trait EventLog: Send + Sync {
    /// Append all events or none.
    fn append(&self, request: AppendRequest) -> Result<(), EventLogError>;

    /// Stream events matching `query` in log order.
    fn read(&self, query: &EventQuery) -> Result<EventStream<'_>, EventLogError>;

    /// Reject further appends and reads.
    fn stop(&self) -> Result<(), EventLogError>;
}

impl fmt::Debug for dyn EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn EventLog")
    }
}
