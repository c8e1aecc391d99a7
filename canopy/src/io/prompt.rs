//! Prompt rendering for model invocations.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::{Map, Value};

const MODEL_TEMPLATE: &str = include_str!("prompts/model.md");

/// One `name: json` line in the prompt.
#[derive(Debug, Clone, Serialize)]
struct Field {
    name: String,
    json: String,
}

impl Field {
    fn list<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Vec<Self> {
        entries
            .map(|(name, value)| Self {
                name: name.clone(),
                json: value.to_string(),
            })
            .collect()
    }
}

/// What a model prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    /// Free-form instructions; may reference `inputs.<key>`.
    pub instructions: Option<&'a str>,
    pub chain_of_thought: bool,
    pub inputs: &'a Map<String, Value>,
    /// Output key → JSON Schema.
    pub outputs: &'a BTreeMap<String, Value>,
}

/// minijinja environment holding the built-in model template.
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("model", MODEL_TEMPLATE)
            .context("load model prompt template")?;
        Ok(Self { env })
    }

    pub fn render(&self, input: &PromptInput<'_>) -> Result<String> {
        let instructions = match input.instructions.map(str::trim).filter(|s| !s.is_empty()) {
            Some(source) => Some(
                self.env
                    .render_str(source, context! { inputs => input.inputs })
                    .context("render model instructions")?,
            ),
            None => None,
        };
        let template = self.env.get_template("model")?;
        let rendered = template
            .render(context! {
                instructions => instructions,
                chain_of_thought => input.chain_of_thought,
                inputs => Field::list(input.inputs.iter()),
                outputs => Field::list(input.outputs.iter()),
            })
            .context("render model prompt")?;
        Ok(rendered)
    }
}

impl std::fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRenderer").finish_non_exhaustive()
    }
}
