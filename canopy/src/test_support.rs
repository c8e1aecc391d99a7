//! Test-only helpers: canned actions, tree construction and a scripted model backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};

use crate::core::status::NodeStatus;
use crate::error::BuildError;
use crate::io::config::EngineConfig;
use crate::io::model::{ModelBackend, ModelRequest, ModelResponse};
use crate::tree::builder::{InitialContext, TreeBuilder};
use crate::tree::description::{Description, action};
use crate::tree::executor::Tree;
use crate::tree::registry::Registry;

/// Action that always reports `status`.
pub fn fixed(status: NodeStatus) -> Description {
    action(move |_| Ok(status))
}

/// Action that bumps `counter` each tick and reports `status`.
pub fn counting_action(counter: &Arc<AtomicUsize>, status: NodeStatus) -> Description {
    let counter = Arc::clone(counter);
    action(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(status)
    })
}

/// Builder over the standard registry with default config.
pub fn standard_builder() -> TreeBuilder {
    TreeBuilder::new(Arc::new(Registry::standard(&EngineConfig::default())))
}

pub fn build_with(description: Description, initial: InitialContext) -> Result<Tree, BuildError> {
    standard_builder().build(description, initial)
}

/// Build with an empty context; panics on build errors.
pub fn build_tree(description: Description) -> Tree {
    match build_with(description, InitialContext::new()) {
        Ok(tree) => tree,
        Err(err) => panic!("build failed: {err}"),
    }
}

/// Model backend that replays canned responses and records requests.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<ModelResponse>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedBackend {
    pub fn new(responses: impl IntoIterator<Item = Result<ModelResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ModelBackend for ScriptedBackend {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted backend has no more responses")))
    }
}
