//! Node kind registry: tag → behavior, plus named callables that JSON
//! descriptions reference through the `fn` option.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::core::schema::SchemaCheck;
use crate::core::status::NodeStatus;
use crate::error::{BuildError, RegistryError};
use crate::io::config::EngineConfig;
use crate::tree::ext::{Invoke, Repeat};
use crate::tree::kinds::{Action, Condition, Fallback, Parallel, Sequence};
use crate::tree::node::{Callable, Node, TickContext};
use crate::tree::stdlib;

/// Behavior of one node kind.
///
/// `build` runs once per node after its children are compiled and its options
/// have passed [`NodeKind::options_schema`]; it may reject the node or
/// normalize it. `tick` must not keep per-node progress: anything that has to
/// survive between ticks goes in the working set.
pub trait NodeKind: Send + Sync {
    fn options_schema(&self) -> Option<Value> {
        None
    }

    fn build(&self, node: Node) -> Result<Node, BuildError> {
        Ok(node)
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus>;
}

/// A registered kind with its compiled options schema.
#[derive(Clone)]
pub struct KindEntry {
    pub kind: Arc<dyn NodeKind>,
    pub options_schema: Option<SchemaCheck>,
}

impl fmt::Debug for KindEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindEntry")
            .field("options_schema", &self.options_schema)
            .finish_non_exhaustive()
    }
}

/// Tag → kind and name → callable tables.
///
/// Registering a taken name replaces the previous entry with a warning,
/// unless the registry is strict.
#[derive(Clone, Default)]
pub struct Registry {
    kinds: HashMap<String, KindEntry>,
    functions: HashMap<String, Callable>,
    strict: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that rejects duplicate registrations.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// The five built-in kinds: `sequence`, `fallback`, `parallel`,
    /// `condition` and `action`.
    pub fn builtin(config: &EngineConfig) -> Self {
        let mut registry = Self {
            strict: config.strict_registry,
            ..Self::default()
        };
        registry.insert_kind("sequence", Arc::new(Sequence));
        registry.insert_kind("fallback", Arc::new(Fallback));
        registry.insert_kind("parallel", Arc::new(Parallel::new(config.parallel_workers)));
        registry.insert_kind("condition", Arc::new(Condition));
        registry.insert_kind("action", Arc::new(Action));
        registry
    }

    /// Built-ins plus `repeat`, `invoke` and the named stdlib functions.
    pub fn standard(config: &EngineConfig) -> Self {
        let mut registry = Self::builtin(config);
        registry.insert_kind(
            "repeat",
            Arc::new(Repeat::new(config.repeat_max_iterations)),
        );
        registry.insert_kind("invoke", Arc::new(Invoke::new(config.subtree_max_ticks)));
        for (name, callable) in stdlib::functions() {
            registry.functions.insert(name.to_string(), callable);
        }
        registry
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Register `kind` under `tag`.
    pub fn register<K>(&mut self, tag: impl Into<String>, kind: K) -> Result<(), RegistryError>
    where
        K: NodeKind + 'static,
    {
        self.register_arc(tag, Arc::new(kind))
    }

    pub fn register_arc(
        &mut self,
        tag: impl Into<String>,
        kind: Arc<dyn NodeKind>,
    ) -> Result<(), RegistryError> {
        let tag = tag.into();
        if self.kinds.contains_key(&tag) {
            if self.strict {
                return Err(RegistryError::DuplicateKind(tag));
            }
            warn!(%tag, "node kind re-registered; previous definition replaced");
        }
        let options_schema = compile_options_schema(&tag, kind.as_ref())?;
        debug!(%tag, "node kind registered");
        self.kinds.insert(
            tag,
            KindEntry {
                kind,
                options_schema,
            },
        );
        Ok(())
    }

    pub fn register_predicate<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&TickContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.register_function(name, Callable::predicate(f))
    }

    pub fn register_action<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&TickContext<'_>) -> Result<NodeStatus> + Send + Sync + 'static,
    {
        self.register_function(name, Callable::action(f))
    }

    pub fn register_projection<F>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&TickContext<'_>) -> Option<Map<String, Value>> + Send + Sync + 'static,
    {
        self.register_function(name, Callable::projection(f))
    }

    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        callable: Callable,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            if self.strict {
                return Err(RegistryError::DuplicateFunction(name));
            }
            warn!(%name, "function re-registered; previous definition replaced");
        }
        self.functions.insert(name, callable);
        Ok(())
    }

    pub fn kind(&self, tag: &str) -> Option<&KindEntry> {
        self.kinds.get(tag)
    }

    pub fn function(&self, name: &str) -> Option<&Callable> {
        self.functions.get(name)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    fn insert_kind(&mut self, tag: &str, kind: Arc<dyn NodeKind>) {
        let options_schema = match compile_options_schema(tag, kind.as_ref()) {
            Ok(check) => check,
            Err(err) => {
                debug_assert!(false, "{err}");
                error!(%err, "built-in options schema does not compile");
                None
            }
        };
        self.kinds.insert(
            tag.to_string(),
            KindEntry {
                kind,
                options_schema,
            },
        );
    }
}

fn compile_options_schema(
    tag: &str,
    kind: &dyn NodeKind,
) -> Result<Option<SchemaCheck>, RegistryError> {
    kind.options_schema()
        .map(|schema| {
            SchemaCheck::compile(&schema).map_err(|reason| RegistryError::InvalidOptionsSchema {
                kind: tag.to_string(),
                reason,
            })
        })
        .transpose()
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        functions.sort_unstable();
        f.debug_struct("Registry")
            .field("kinds", &self.tags())
            .field("functions", &functions)
            .field("strict", &self.strict)
            .finish()
    }
}
