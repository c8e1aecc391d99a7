//! Read filters over the durable history.

use std::collections::BTreeSet;

use crate::core::event::{Event, EventId, Tag};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("as_of and after are mutually exclusive")]
    BothBounds,
}

/// Filter for event log reads and CAS preconditions.
///
/// - `types`: event type must be one of these (empty = any type).
/// - `tags`: event must carry every listed tag (empty = no tag constraint).
/// - `as_of`: only events strictly before this id.
/// - `after`: only events strictly after this id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub types: BTreeSet<String>,
    pub tags: BTreeSet<Tag>,
    pub as_of: Option<EventId>,
    pub after: Option<EventId>,
}

impl EventQuery {
    /// Matches every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of_type(event_type: impl Into<String>) -> Self {
        Self::default().with_type(event_type)
    }

    #[must_use]
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.types.insert(event_type.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    #[must_use]
    pub fn as_of(mut self, id: EventId) -> Self {
        self.as_of = Some(id);
        self
    }

    #[must_use]
    pub fn after(mut self, id: EventId) -> Self {
        self.after = Some(id);
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.as_of.is_some() && self.after.is_some() {
            return Err(QueryError::BothBounds);
        }
        Ok(())
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.types.is_empty() && !self.types.contains(&event.event_type) {
            return false;
        }
        if !self.tags.iter().all(|tag| event.has_tag(tag)) {
            return false;
        }
        if let Some(as_of) = self.as_of {
            if event.id >= as_of {
                return false;
            }
        }
        if let Some(after) = self.after {
            if event.id <= after {
                return false;
            }
        }
        true
    }
}
