//! Working set: the per-tree mutable memory.
//!
//! One JSON object shared by every node of a tree instance. Each call is atomic
//! on its own; there is no isolation across calls. Children of a `parallel`
//! node that touch the same path race, so they are expected to write disjoint
//! paths.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use crate::core::path::{MemoryPath, PathError};

/// Cloneable handle; clones share the same cells.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    cells: Arc<RwLock<Value>>,
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self::from_map(Map::new())
    }
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            cells: Arc::new(RwLock::new(Value::Object(map))),
        }
    }

    pub fn get(&self, path: &MemoryPath) -> Option<Value> {
        path.get(&self.read()).cloned()
    }

    /// [`WorkingSet::get`] with a dotted path; unparsable paths read as absent.
    pub fn get_str(&self, raw: &str) -> Option<Value> {
        let path = MemoryPath::parse(raw).ok()?;
        self.get(&path)
    }

    pub fn contains(&self, path: &MemoryPath) -> bool {
        path.get(&self.read()).is_some()
    }

    pub fn set(&self, path: &MemoryPath, value: Value) -> Result<(), PathError> {
        path.set(&mut self.write(), value)
    }

    pub fn set_str(&self, raw: &str, value: Value) -> Result<(), PathError> {
        self.set(&MemoryPath::parse(raw)?, value)
    }

    pub fn remove(&self, path: &MemoryPath) -> Option<Value> {
        path.remove(&mut self.write())
    }

    /// Read-modify-write of one path under a single lock acquisition.
    ///
    /// Returns the stored value.
    pub fn update<F>(&self, path: &MemoryPath, f: F) -> Result<Value, PathError>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut root = self.write();
        let next = f(path.get(&root));
        path.set(&mut root, next.clone())?;
        Ok(next)
    }

    /// Copy of the whole working set.
    pub fn snapshot(&self) -> Value {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.cells.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.cells.write().unwrap_or_else(PoisonError::into_inner)
    }
}
