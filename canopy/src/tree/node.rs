//! Executable nodes, callables and the context they tick with.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::trace;

use crate::core::memory::LongTermMemory;
use crate::core::path::MemoryPath;
use crate::core::status::NodeStatus;
use crate::core::working_set::WorkingSet;
use crate::io::event_log::EventLog;
use crate::tree::registry::NodeKind;

pub type PredicateFn = Arc<dyn Fn(&TickContext<'_>) -> bool + Send + Sync>;
pub type ActionFn = Arc<dyn Fn(&TickContext<'_>) -> Result<NodeStatus> + Send + Sync>;
/// Seeds a nested tree's working set; `None` means the input is unavailable.
pub type ProjectionFn = Arc<dyn Fn(&TickContext<'_>) -> Option<Map<String, Value>> + Send + Sync>;

/// Caller-supplied behavior attached to a node.
#[derive(Clone)]
pub enum Callable {
    Predicate(PredicateFn),
    Action(ActionFn),
    Projection(ProjectionFn),
}

impl Callable {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&TickContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn action<F>(f: F) -> Self
    where
        F: Fn(&TickContext<'_>) -> Result<NodeStatus> + Send + Sync + 'static,
    {
        Self::Action(Arc::new(f))
    }

    pub fn projection<F>(f: F) -> Self
    where
        F: Fn(&TickContext<'_>) -> Option<Map<String, Value>> + Send + Sync + 'static,
    {
        Self::Projection(Arc::new(f))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Callable::Predicate(_) => "predicate",
            Callable::Action(_) => "action",
            Callable::Projection(_) => "projection",
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable::{}", self.label())
    }
}

/// State shared by every node of one tree instance.
///
/// Cloning is cheap and shares the working set.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    working: WorkingSet,
    long_term: LongTermMemory,
    event_log: Option<Arc<dyn EventLog>>,
    extras: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(
        working: WorkingSet,
        long_term: LongTermMemory,
        event_log: Option<Arc<dyn EventLog>>,
        extras: Map<String, Value>,
    ) -> Self {
        Self {
            working,
            long_term,
            event_log,
            extras,
        }
    }

    pub fn working(&self) -> &WorkingSet {
        &self.working
    }

    pub fn long_term(&self) -> &LongTermMemory {
        &self.long_term
    }

    pub fn event_log(&self) -> Option<&Arc<dyn EventLog>> {
        self.event_log.as_ref()
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    /// Look `path` up in the working set, then in long-term memory.
    pub fn lookup(&self, path: &MemoryPath) -> Option<Value> {
        self.working
            .get(path)
            .or_else(|| self.long_term.get(path).cloned())
    }

    /// Context for a nested tree: own working set, same history and extras.
    pub fn with_working(&self, working: WorkingSet) -> Self {
        Self {
            working,
            ..self.clone()
        }
    }

    pub(crate) fn long_term_mut(&mut self) -> &mut LongTermMemory {
        &mut self.long_term
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("working", &self.working)
            .field("long_term", &self.long_term)
            .field("event_log", &self.event_log.is_some())
            .field("extras", &self.extras)
            .finish()
    }
}

/// What a callable sees during a tick: the shared context plus the node being
/// ticked (for its options).
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    exec: &'a ExecutionContext,
    node: &'a Node,
}

impl<'a> TickContext<'a> {
    pub fn new(exec: &'a ExecutionContext, node: &'a Node) -> Self {
        Self { exec, node }
    }

    pub fn exec(&self) -> &'a ExecutionContext {
        self.exec
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn working(&self) -> &'a WorkingSet {
        self.exec.working()
    }

    pub fn long_term(&self) -> &'a LongTermMemory {
        self.exec.long_term()
    }

    pub fn event_log(&self) -> Option<&'a Arc<dyn EventLog>> {
        self.exec.event_log()
    }

    pub fn extras(&self) -> &'a Map<String, Value> {
        self.exec.extras()
    }

    pub fn options(&self) -> &'a Map<String, Value> {
        self.node.options()
    }

    pub fn option(&self, key: &str) -> Option<&'a Value> {
        self.node.option(key)
    }

    pub fn lookup(&self, path: &MemoryPath) -> Option<Value> {
        self.exec.lookup(path)
    }
}

/// An executable unit of a compiled tree.
///
/// Built once by the builder; `location` is the child-index path from the root
/// (`root/0/2`).
#[derive(Clone)]
pub struct Node {
    tag: String,
    location: String,
    options: Map<String, Value>,
    callable: Option<Callable>,
    children: Vec<Node>,
    kind: Arc<dyn NodeKind>,
}

impl Node {
    pub(crate) fn new(
        tag: String,
        location: String,
        options: Map<String, Value>,
        callable: Option<Callable>,
        children: Vec<Node>,
        kind: Arc<dyn NodeKind>,
    ) -> Self {
        Self {
            tag,
            location,
            options,
            callable,
            children,
            kind,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// The `id` option, used for audit correlation.
    pub fn id(&self) -> Option<&str> {
        self.options.get("id").and_then(Value::as_str)
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn callable(&self) -> Option<&Callable> {
        self.callable.as_ref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Overwrite an option while a kind normalizes the node at build time.
    pub fn set_option(&mut self, key: impl Into<String>, value: Value) {
        self.options.insert(key.into(), value);
    }

    /// Replace the callable while a kind normalizes the node at build time.
    pub fn set_callable(&mut self, callable: Callable) {
        self.callable = Some(callable);
    }

    /// One evaluation step of this node and, through its kind, its subtree.
    pub fn tick(&self, exec: &ExecutionContext) -> Result<NodeStatus> {
        let ctx = TickContext::new(exec, self);
        let status = self.kind.tick(self, &ctx)?;
        trace!(kind = %self.tag, location = %self.location, %status, "ticked");
        Ok(status)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("tag", &self.tag)
            .field("location", &self.location)
            .field("options", &self.options)
            .field("callable", &self.callable)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
