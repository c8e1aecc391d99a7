//! Symbolic paths into JSON memory (working set, long-term memory).
//!
//! A path is a non-empty sequence of segments. Segments address object keys,
//! or array slots when the value at that depth is an array (`pairs.0.num1`).

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("empty segment in path '{0}'")]
    EmptySegment(String),
    #[error("path must be a string or an array of keys/indices, got {0}")]
    InvalidValue(String),
    #[error("cannot descend into {kind} at '{at}'")]
    NotAContainer { at: String, kind: &'static str },
    #[error("'{segment}' is not an array index at '{at}'")]
    NotAnIndex { segment: String, at: String },
    #[error("index {index} out of bounds (len {len}) at '{at}'")]
    IndexOutOfBounds { index: usize, len: usize, at: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryPath {
    segments: Vec<String>,
}

impl MemoryPath {
    /// Parse a dotted path (`a.b.0`).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Parse a path from JSON: a dotted string or an array of strings and
    /// non-negative integers.
    pub fn from_value(value: &Value) -> Result<Self, PathError> {
        match value {
            Value::String(raw) => Self::parse(raw),
            Value::Array(items) => {
                let mut segments = Vec::with_capacity(items.len());
                for item in items {
                    let segment = match item {
                        Value::String(key) if !key.is_empty() => key.clone(),
                        Value::Number(n) if n.is_u64() => n.to_string(),
                        other => return Err(PathError::InvalidValue(other.to_string())),
                    };
                    segments.push(segment);
                }
                if segments.is_empty() {
                    return Err(PathError::Empty);
                }
                Ok(Self { segments })
            }
            other => Err(PathError::InvalidValue(other.to_string())),
        }
    }

    /// Single-segment path.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: vec![key.into()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// New path with `segment` appended.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at this path, creating missing intermediate objects.
    ///
    /// Array slots may be replaced, or appended when the index equals the length.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), PathError> {
        let (last, parents) = self.segments.split_last().ok_or(PathError::Empty)?;
        let mut current = root;
        for (depth, segment) in parents.iter().enumerate() {
            current = descend_or_create(current, segment, || self.prefix(depth))?;
        }
        assign(current, last, value, || self.to_string())
    }

    pub fn remove(&self, root: &mut Value) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = root;
        for segment in parents {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match current {
            Value::Object(map) => map.remove(last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        }
    }

    fn prefix(&self, depth: usize) -> String {
        self.segments[..=depth].join(".")
    }
}

fn descend_or_create<'a>(
    current: &'a mut Value,
    segment: &str,
    at: impl Fn() -> String,
) -> Result<&'a mut Value, PathError> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let index = parse_index(segment, &at)?;
            let len = items.len();
            items.get_mut(index).ok_or_else(|| PathError::IndexOutOfBounds {
                index,
                len,
                at: at(),
            })
        }
        other => Err(PathError::NotAContainer {
            at: at(),
            kind: kind_name(other),
        }),
    }
}

fn assign(
    current: &mut Value,
    segment: &str,
    value: Value,
    at: impl Fn() -> String,
) -> Result<(), PathError> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(segment.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(segment, &at)?;
            let len = items.len();
            if index < len {
                items[index] = value;
                Ok(())
            } else if index == len {
                items.push(value);
                Ok(())
            } else {
                Err(PathError::IndexOutOfBounds {
                    index,
                    len,
                    at: at(),
                })
            }
        }
        other => Err(PathError::NotAContainer {
            at: at(),
            kind: kind_name(other),
        }),
    }
}

fn parse_index(segment: &str, at: &impl Fn() -> String) -> Result<usize, PathError> {
    segment.parse::<usize>().map_err(|_| PathError::NotAnIndex {
        segment: segment.to_string(),
        at: at(),
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for MemoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for MemoryPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_rejects_empty_segments() {
        assert_eq!(MemoryPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            MemoryPath::parse("a..b"),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn from_value_accepts_mixed_arrays() {
        let path = MemoryPath::from_value(&json!(["pairs", 1, "num2"])).expect("path");
        assert_eq!(path.to_string(), "pairs.1.num2");
        assert!(MemoryPath::from_value(&json!([])).is_err());
        assert!(MemoryPath::from_value(&json!([-1])).is_err());
        assert!(MemoryPath::from_value(&json!(42)).is_err());
    }

    #[test]
    fn get_descends_objects_and_arrays() {
        let root = json!({"pairs": [{"num1": 5}, {"num1": 10}]});
        let path = MemoryPath::parse("pairs.1.num1").expect("path");
        assert_eq!(path.get(&root), Some(&json!(10)));
        assert_eq!(MemoryPath::parse("pairs.2").expect("path").get(&root), None);
        assert_eq!(MemoryPath::parse("pairs.x").expect("path").get(&root), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = json!({});
        MemoryPath::parse("a.b.c")
            .expect("path")
            .set(&mut root, json!(1))
            .expect("set");
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_appends_at_array_len_and_rejects_gaps() {
        let mut root = json!({"results": [8]});
        MemoryPath::parse("results.1")
            .expect("path")
            .set(&mut root, json!(17))
            .expect("append");
        assert_eq!(root, json!({"results": [8, 17]}));

        let err = MemoryPath::parse("results.5")
            .expect("path")
            .set(&mut root, json!(0))
            .expect_err("gap");
        assert!(matches!(err, PathError::IndexOutOfBounds { index: 5, len: 2, .. }));
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut root = json!({"n": 3});
        let err = MemoryPath::parse("n.x")
            .expect("path")
            .set(&mut root, json!(1))
            .expect_err("scalar");
        assert_eq!(
            err,
            PathError::NotAContainer {
                at: "n.x".to_string(),
                kind: "number"
            }
        );
    }

    #[test]
    fn remove_returns_previous_value() {
        let mut root = json!({"a": {"b": 1}, "list": [1, 2]});
        let removed = MemoryPath::parse("a.b").expect("path").remove(&mut root);
        assert_eq!(removed, Some(json!(1)));
        let removed = MemoryPath::parse("list.0").expect("path").remove(&mut root);
        assert_eq!(removed, Some(json!(1)));
        assert_eq!(root, json!({"a": {}, "list": [2]}));
    }
}
