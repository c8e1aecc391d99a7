//! Compiles descriptions into executable trees.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::core::memory::{LongTermMemory, MemoryProjection};
use crate::core::working_set::WorkingSet;
use crate::error::BuildError;
use crate::io::event_log::EventLog;
use crate::tree::description::Description;
use crate::tree::executor::Tree;
use crate::tree::node::{ExecutionContext, Node};
use crate::tree::registry::Registry;

/// What a tree starts with besides its nodes.
#[derive(Debug, Clone, Default)]
pub struct InitialContext {
    /// Seed for the working set; must be a JSON object (or null).
    pub working: Value,
    pub event_log: Option<Arc<dyn EventLog>>,
    pub long_term: Option<MemoryProjection>,
    pub extras: Map<String, Value>,
}

impl InitialContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_working(mut self, working: Value) -> Self {
        self.working = working;
        self
    }

    #[must_use]
    pub fn with_event_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    #[must_use]
    pub fn with_long_term(mut self, projection: MemoryProjection) -> Self {
        self.long_term = Some(projection);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TreeBuilder {
    registry: Arc<Registry>,
}

impl TreeBuilder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Compile `description` and set up its execution context.
    ///
    /// Long-term memory is materialized here, once; see
    /// [`Tree::refresh_long_term`] for later folds.
    #[instrument(skip_all, fields(root = %description.kind))]
    pub fn build(
        &self,
        description: Description,
        initial: InitialContext,
    ) -> Result<Tree, BuildError> {
        let root = self.compile(description)?;

        let working = match initial.working {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(BuildError::InvalidContext(format!(
                    "working memory seed must be an object, got {other}"
                )));
            }
        };

        let long_term = match &initial.long_term {
            Some(projection) => {
                let log = initial
                    .event_log
                    .as_deref()
                    .ok_or(BuildError::MissingEventLog)?;
                LongTermMemory::materialize(projection, log).map_err(BuildError::Memory)?
            }
            None => LongTermMemory::default(),
        };

        let context = ExecutionContext::new(
            WorkingSet::from_map(working),
            long_term,
            initial.event_log,
            initial.extras,
        );
        debug!("tree built");
        Ok(Tree::new(root, context, initial.long_term))
    }

    /// Compile the node graph only.
    pub fn compile(&self, description: Description) -> Result<Node, BuildError> {
        self.compile_at(description, "root".to_string())
    }

    fn compile_at(&self, description: Description, location: String) -> Result<Node, BuildError> {
        let Description {
            kind: tag,
            options,
            callable,
            children,
        } = description;

        let entry = self
            .registry
            .kind(&tag)
            .ok_or_else(|| BuildError::UnknownKind {
                kind: tag.clone(),
                location: location.clone(),
            })?;

        if let Some(schema) = &entry.options_schema {
            schema
                .check(&Value::Object(options.clone()))
                .map_err(|errors| BuildError::InvalidOptions {
                    kind: tag.clone(),
                    location: location.clone(),
                    errors,
                })?;
        }

        let callable = match (callable, options.get("fn")) {
            (Some(callable), _) => Some(callable),
            (None, Some(Value::String(name))) => Some(
                self.registry
                    .function(name)
                    .cloned()
                    .ok_or_else(|| BuildError::UnknownFunction {
                        name: name.clone(),
                        kind: tag.clone(),
                        location: location.clone(),
                    })?,
            ),
            (None, Some(other)) => {
                return Err(BuildError::malformed(
                    &location,
                    format!("`fn` must name a registered function, got {other}"),
                ));
            }
            (None, None) => None,
        };

        let children = children
            .into_iter()
            .enumerate()
            .map(|(index, child)| self.compile_at(child, format!("{location}/{index}")))
            .collect::<Result<Vec<_>, _>>()?;

        let node = Node::new(
            tag,
            location,
            options,
            callable,
            children,
            Arc::clone(&entry.kind),
        );
        entry.kind.build(node)
    }
}
