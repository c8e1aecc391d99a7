//! Long-term memory: read models folded from the durable history.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::core::event::Event;
use crate::core::path::MemoryPath;
use crate::core::query::EventQuery;
use crate::io::event_log::{EventLog, EventLogError};

/// Folds one event into the state.
pub type Reducer = Arc<dyn Fn(Value, &Event) -> Value + Send + Sync>;

/// Which events to read and how to fold them.
///
/// Events matching any query are folded once each, in log order. An empty
/// query list folds nothing.
#[derive(Clone)]
pub struct MemoryProjection {
    pub queries: Vec<EventQuery>,
    pub initial: Value,
    pub reducer: Reducer,
}

impl MemoryProjection {
    pub fn new<F>(initial: Value, reducer: F) -> Self
    where
        F: Fn(Value, &Event) -> Value + Send + Sync + 'static,
    {
        Self {
            queries: Vec::new(),
            initial,
            reducer: Arc::new(reducer),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: EventQuery) -> Self {
        self.queries.push(query);
        self
    }
}

impl fmt::Debug for MemoryProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProjection")
            .field("queries", &self.queries)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

/// Fold `events` into `initial`, in iteration order.
pub fn reduce_events<'a, I>(initial: Value, events: I, reducer: &Reducer) -> Value
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .fold(initial, |state, event| reducer(state, event))
}

/// Materialized read model, read-only to nodes.
///
/// `position` counts the log entries already scanned, so a refresh only looks
/// at what was appended since.
#[derive(Debug, Clone)]
pub struct LongTermMemory {
    state: Arc<Value>,
    position: usize,
}

impl Default for LongTermMemory {
    fn default() -> Self {
        Self::from_value(Value::Null)
    }
}

impl LongTermMemory {
    pub fn from_value(state: Value) -> Self {
        Self {
            state: Arc::new(state),
            position: 0,
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn get(&self, path: &MemoryPath) -> Option<&Value> {
        path.get(&self.state)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Read every projected event and fold from the initial state.
    pub fn materialize(
        projection: &MemoryProjection,
        log: &dyn EventLog,
    ) -> Result<Self, EventLogError> {
        let (events, position) = collect_events(&projection.queries, log, 0)?;
        let state = reduce_events(projection.initial.clone(), &events, &projection.reducer);
        debug!(folded = events.len(), position, "materialized long-term memory");
        Ok(Self {
            state: Arc::new(state),
            position,
        })
    }

    /// Fold only events appended since the last scan onto the current state.
    ///
    /// Returns the number of events folded.
    pub fn refresh(
        &mut self,
        projection: &MemoryProjection,
        log: &dyn EventLog,
    ) -> Result<usize, EventLogError> {
        let (events, position) = collect_events(&projection.queries, log, self.position)?;
        self.position = position;
        if events.is_empty() {
            return Ok(0);
        }
        let state = reduce_events((*self.state).clone(), &events, &projection.reducer);
        self.state = Arc::new(state);
        debug!(folded = events.len(), position, "refreshed long-term memory");
        Ok(events.len())
    }
}

/// Scan the log from entry `skip` on and keep events matching any query.
///
/// Returns the matches in log order and the new scan position.
fn collect_events(
    queries: &[EventQuery],
    log: &dyn EventLog,
    skip: usize,
) -> Result<(Vec<Event>, usize), EventLogError> {
    if queries.is_empty() {
        return Ok((Vec::new(), skip));
    }
    for query in queries {
        query.validate()?;
    }
    let mut position = skip;
    let mut matched = Vec::new();
    for event in log.read(&EventQuery::all())?.skip(skip) {
        let event = event?;
        position += 1;
        if queries.iter().any(|query| query.matches(&event)) {
            matched.push(event);
        }
    }
    Ok((matched, position))
}
