//! In-process event log.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use super::{AppendRequest, EventLog, EventLogError, EventStream, StoredEvent};
use crate::core::event::{Event, EventId};
use crate::core::query::EventQuery;

#[derive(Debug, Default)]
struct Inner {
    events: Vec<StoredEvent>,
    ids: HashSet<EventId>,
}

/// Event log held in memory; discarded when dropped.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    inner: RwLock<Inner>,
    stopped: AtomicBool,
}

impl InMemoryEventLog {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read_inner().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transaction metadata recorded with the event `id`.
    pub fn tx_metadata(&self, id: EventId) -> Option<Map<String, Value>> {
        self.read_inner()
            .events
            .iter()
            .find(|stored| stored.event.id == id)
            .and_then(|stored| stored.tx.clone())
    }

    fn ensure_running(&self) -> Result<(), EventLogError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EventLogError::Stopped);
        }
        Ok(())
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventLog for InMemoryEventLog {
    #[instrument(skip_all, fields(events = request.events.len(), cas = request.cas.is_some()))]
    fn append(&self, request: AppendRequest) -> Result<(), EventLogError> {
        self.ensure_running()?;
        request.validate()?;
        if request.events.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cas) = &request.cas {
            if let Err(err) = cas.evaluate(inner.events.iter().map(|stored| &stored.event)) {
                warn!(%err, "append rejected by precondition");
                return Err(err);
            }
        }
        if let Some(existing) = request.events.iter().find(|event| inner.ids.contains(&event.id)) {
            return Err(EventLogError::DuplicateId(existing.id));
        }

        let count = request.events.len();
        for event in request.events {
            inner.ids.insert(event.id);
            inner.events.push(StoredEvent {
                event,
                tx: request.tx_metadata.clone(),
            });
        }
        debug!(appended = count, total = inner.events.len(), "events appended");
        Ok(())
    }

    fn read(&self, query: &EventQuery) -> Result<EventStream<'_>, EventLogError> {
        self.ensure_running()?;
        query.validate()?;
        Ok(Box::new(MemoryStream {
            log: self,
            query: query.clone(),
            position: 0,
        }))
    }

    fn stop(&self) -> Result<(), EventLogError> {
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }
}

/// Takes the read lock per item, so events appended while a stream is open
/// become visible to it.
struct MemoryStream<'a> {
    log: &'a InMemoryEventLog,
    query: EventQuery,
    position: usize,
}

impl Iterator for MemoryStream<'_> {
    type Item = Result<Event, EventLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        let inner = self.log.read_inner();
        while let Some(stored) = inner.events.get(self.position) {
            self.position += 1;
            if self.query.matches(&stored.event) {
                return Some(Ok(stored.event.clone()));
            }
        }
        None
    }
}
