//! Model invocation: a structured model call packaged as an action node.
//!
//! Inputs are read from memory and validated against the signature, the
//! backend is called, outputs are validated and written to the working set,
//! and a `predicted`/`reasoned` audit event is appended when a log is present.
//! Every validation or backend problem is a `Failure`, never a fault.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::core::event::{NewEvent, Tag, make_event};
use crate::core::path::{MemoryPath, PathError};
use crate::core::schema::SchemaCheck;
use crate::core::status::NodeStatus;
use crate::error::BuildError;
use crate::io::config::ModelConfig;
use crate::io::event_log::AppendRequest;
use crate::io::process::run_with_timeout;
use crate::io::prompt::{PromptInput, PromptRenderer};
use crate::tree::description::Description;
use crate::tree::kinds::{Action, reject_children};
use crate::tree::node::{Callable, Node, TickContext};
use crate::tree::registry::NodeKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[default]
    Predict,
    /// Like `Predict`, but the backend must also return its reasoning.
    ChainOfThought,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Predict => "predict",
            Operation::ChainOfThought => "chainOfThought",
        }
    }

    /// Type of the audit event appended after a successful call.
    pub fn event_type(self) -> &'static str {
        match self {
            Operation::Predict => "predicted",
            Operation::ChainOfThought => "reasoned",
        }
    }
}

/// Input and output keys with their JSON Schemas. Keys double as memory paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl ModelSignature {
    #[must_use]
    pub fn input(mut self, key: impl Into<String>, schema: Value) -> Self {
        self.inputs.insert(key.into(), schema);
        self
    }

    #[must_use]
    pub fn output(mut self, key: impl Into<String>, schema: Value) -> Self {
        self.outputs.insert(key.into(), schema);
        self
    }
}

/// Sent to the backend (as JSON on stdin for [`CommandBackend`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    pub node_id: String,
    pub operation: Operation,
    pub prompt: String,
    pub inputs: Map<String, Value>,
    /// Output key → JSON Schema.
    pub outputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Performs the actual model call.
pub trait ModelBackend: Send + Sync {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

/// Backend that runs a command: request JSON on stdin, response JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBackend {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.timeout(),
            config.output_limit_bytes,
        )
    }
}

impl ModelBackend for CommandBackend {
    #[instrument(skip_all, fields(node_id = %request.node_id))]
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("model command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        let payload = serde_json::to_vec(request).context("serialize model request")?;

        let output = run_with_timeout(cmd, Some(payload), self.timeout, self.output_limit_bytes)?;
        if output.timed_out {
            bail!("model backend timed out after {}s", self.timeout.as_secs());
        }
        if !output.status.success() {
            bail!(
                "model backend exited with {}: {}",
                output.status,
                output.stderr_lossy()
            );
        }
        if output.stdout_truncated > 0 {
            bail!(
                "model backend response exceeded {} bytes",
                self.output_limit_bytes
            );
        }
        serde_json::from_slice(&output.stdout).context("parse model backend response")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid model options: {0}")]
    Options(#[source] serde_json::Error),
    #[error("{side} `{key}`: invalid schema: {reason}")]
    Schema {
        side: &'static str,
        key: String,
        reason: String,
    },
    #[error("{side} `{key}`: {source}")]
    Path {
        side: &'static str,
        key: String,
        #[source]
        source: PathError,
    },
}

#[derive(Debug, Clone)]
struct Field {
    key: String,
    path: MemoryPath,
    schema: SchemaCheck,
}

fn compile_fields(
    side: &'static str,
    fields: &BTreeMap<String, Value>,
) -> Result<Vec<Field>, SignatureError> {
    fields
        .iter()
        .map(|(key, schema)| {
            let path = MemoryPath::parse(key).map_err(|source| SignatureError::Path {
                side,
                key: key.clone(),
                source,
            })?;
            let schema = SchemaCheck::compile(schema).map_err(|reason| SignatureError::Schema {
                side,
                key: key.clone(),
                reason,
            })?;
            Ok(Field {
                key: key.clone(),
                path,
                schema,
            })
        })
        .collect()
}

/// Options record of a `model` node.
#[derive(Debug, Clone, Deserialize)]
struct ModelOptions {
    id: String,
    #[serde(default)]
    signature: ModelSignature,
    #[serde(default)]
    operation: Operation,
    #[serde(default)]
    instructions: Option<String>,
}

/// A compiled model call, ready to run against any backend.
#[derive(Clone)]
pub struct ModelInvocation {
    id: String,
    operation: Operation,
    instructions: Option<String>,
    signature: ModelSignature,
    inputs: Vec<Field>,
    outputs: Vec<Field>,
    prompts: Arc<PromptRenderer>,
}

impl ModelInvocation {
    pub fn new(
        id: impl Into<String>,
        signature: ModelSignature,
        operation: Operation,
    ) -> Result<Self> {
        let inputs = compile_fields("input", &signature.inputs)?;
        let outputs = compile_fields("output", &signature.outputs)?;
        Ok(Self {
            id: id.into(),
            operation,
            instructions: None,
            signature,
            inputs,
            outputs,
            prompts: Arc::new(PromptRenderer::new()?),
        })
    }

    /// Parse a `model` node's options.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let options: ModelOptions = serde_json::from_value(Value::Object(options.clone()))
            .map_err(SignatureError::Options)?;
        let mut invocation = Self::new(options.id, options.signature, options.operation)?;
        invocation.instructions = options.instructions;
        Ok(invocation)
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// Package as a plain `action` description (no `model` kind needed).
    pub fn into_description(self, backend: Arc<dyn ModelBackend>) -> Description {
        let id = self.id.clone();
        let operation = self.operation.as_str();
        let signature = serde_json::to_value(&self.signature).unwrap_or(Value::Null);
        Description::new("action")
            .with_callable(Callable::action(move |ctx| self.run(backend.as_ref(), ctx)))
            .with_id(id)
            .with_option("operation", Value::from(operation))
            .with_option("signature", signature)
    }

    /// One model call. See the module docs for the failure policy.
    #[instrument(skip_all, fields(node_id = %self.id, operation = self.operation.as_str()))]
    pub fn run(&self, backend: &dyn ModelBackend, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        let mut inputs = Map::new();
        for field in &self.inputs {
            let Some(value) = ctx.lookup(&field.path) else {
                warn!(input = %field.key, "model input missing");
                return Ok(NodeStatus::Failure);
            };
            if let Err(errors) = field.schema.check(&value) {
                warn!(input = %field.key, errors = %errors.join("; "), "model input rejected");
                return Ok(NodeStatus::Failure);
            }
            inputs.insert(field.key.clone(), value);
        }

        let prompt = self.prompts.render(&PromptInput {
            instructions: self.instructions.as_deref(),
            chain_of_thought: self.operation == Operation::ChainOfThought,
            inputs: &inputs,
            outputs: &self.signature.outputs,
        })?;
        let request = ModelRequest {
            node_id: self.id.clone(),
            operation: self.operation,
            prompt,
            inputs,
            outputs: self.signature.outputs.clone(),
        };
        let mut response = match backend.invoke(&request) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "model backend failed");
                return Ok(NodeStatus::Failure);
            }
        };

        let mut outputs = Map::new();
        for field in &self.outputs {
            let Some(value) = response.outputs.remove(&field.key) else {
                warn!(output = %field.key, "model output missing");
                return Ok(NodeStatus::Failure);
            };
            if let Err(errors) = field.schema.check(&value) {
                warn!(output = %field.key, errors = %errors.join("; "), "model output rejected");
                return Ok(NodeStatus::Failure);
            }
            outputs.insert(field.key.clone(), value);
        }
        let reasoning = match self.operation {
            Operation::Predict => None,
            Operation::ChainOfThought => {
                match response.reasoning.filter(|reasoning| !reasoning.trim().is_empty()) {
                    Some(reasoning) => Some(reasoning),
                    None => {
                        warn!("model returned no reasoning");
                        return Ok(NodeStatus::Failure);
                    }
                }
            }
        };

        // The audit event is committed before the working set changes, so a
        // failed append leaves memory untouched.
        if let Some(log) = ctx.event_log() {
            let mut body = Map::new();
            body.insert("nodeId".to_string(), json!(self.id));
            body.insert("inputs".to_string(), Value::Object(request.inputs));
            body.insert("outputs".to_string(), Value::Object(outputs.clone()));
            if let Some(reasoning) = reasoning {
                body.insert("reasoning".to_string(), Value::String(reasoning));
            }
            let event = make_event(
                NewEvent::new(self.operation.event_type())
                    .with_tag(Tag::new("node", self.id.clone()))
                    .with_body(body),
            );
            log.append(AppendRequest::new(vec![event]))
                .context("append model audit event")?;
        }
        for field in &self.outputs {
            if let Some(value) = outputs.remove(&field.key) {
                ctx.working().set(&field.path, value)?;
            }
        }
        debug!("model invocation succeeded");
        Ok(NodeStatus::Success)
    }
}

impl std::fmt::Debug for ModelInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvocation")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// The `model` node kind: options `{id, signature, operation?, instructions?}`.
#[derive(Clone)]
pub struct ModelKind {
    backend: Arc<dyn ModelBackend>,
}

impl ModelKind {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }
}

impl NodeKind for ModelKind {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "required": ["id", "signature"],
            "properties": {
                "id": {"type": "string", "minLength": 1},
                "operation": {"enum": ["predict", "chainOfThought"]},
                "instructions": {"type": "string"},
                "signature": {
                    "type": "object",
                    "properties": {
                        "inputs": {"type": "object"},
                        "outputs": {"type": "object"}
                    }
                }
            }
        }))
    }

    fn build(&self, mut node: Node) -> Result<Node, BuildError> {
        reject_children(&node)?;
        if node.callable().is_some() {
            return Err(BuildError::invalid_node(&node, "takes no callable"));
        }
        let invocation = ModelInvocation::from_options(node.options())
            .map_err(|err| BuildError::invalid_node(&node, format!("{err:#}")))?;
        let backend = Arc::clone(&self.backend);
        node.set_callable(Callable::action(move |ctx| {
            invocation.run(backend.as_ref(), ctx)
        }));
        Ok(node)
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        Action.tick(node, ctx)
    }
}
