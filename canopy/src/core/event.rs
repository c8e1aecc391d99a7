//! Immutable durable-history records.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Time-ordered unique event identifier (UUIDv7).
///
/// Ids generated in one process sort in creation order, so `as_of`/`after`
/// bounds compare ids directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// `(entity type, entity id)` index entry attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub entity_type: String,
    pub entity_id: String,
}

impl Tag {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tag '{0}' (expected TYPE:ID)")]
pub struct TagParseError(String);

impl FromStr for Tag {
    type Err = TagParseError;

    /// Parse `TYPE:ID`; the id may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((entity_type, entity_id)) if !entity_type.is_empty() && !entity_id.is_empty() => {
                Ok(Self::new(entity_type, entity_id))
            }
            _ => Err(TagParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
    #[serde(default)]
    pub body: Map<String, Value>,
}

impl Event {
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }
}

/// Input to [`make_event`].
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub event_type: String,
    pub body: Map<String, Value>,
    pub tags: BTreeSet<Tag>,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

/// Stamp a new event with a fresh id and the current time.
pub fn make_event(new: NewEvent) -> Event {
    Event {
        id: EventId::generate(),
        timestamp: Utc::now(),
        event_type: new.event_type,
        tags: new.tags,
        body: new.body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_sort_in_creation_order() {
        let ids: Vec<EventId> = (0..64).map(|_| EventId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn tag_parses_type_and_id() {
        let tag: Tag = "node:add-pair".parse().expect("tag");
        assert_eq!(tag, Tag::new("node", "add-pair"));
        let tag: Tag = "url:https://x".parse().expect("tag with colon in id");
        assert_eq!(tag.entity_id, "https://x");
        assert!("node".parse::<Tag>().is_err());
        assert!(":id".parse::<Tag>().is_err());
    }

    #[test]
    fn event_serializes_type_field() {
        let event = make_event(
            NewEvent::new("predicted")
                .with_tag(Tag::new("node", "n1"))
                .with_body(json!({"k": 1}).as_object().cloned().unwrap_or_default()),
        );
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], json!("predicted"));
        assert_eq!(value["tags"][0]["entity_type"], json!("node"));
        let back: Event = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, event);
    }
}
