//! JSON Schema checks for node options, condition values and model signatures.

use std::fmt;
use std::sync::Arc;

use jsonschema::{Validator, validator_for};
use serde_json::Value;

/// A compiled JSON Schema.
#[derive(Clone)]
pub struct SchemaCheck {
    raw: Value,
    compiled: Arc<Validator>,
}

impl SchemaCheck {
    /// Compile `schema`; the error carries the compiler's message.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let compiled = validator_for(schema).map_err(|err| err.to_string())?;
        Ok(Self {
            raw: schema.clone(),
            compiled: Arc::new(compiled),
        })
    }

    /// Validate `instance`, collecting every violation message.
    pub fn check(&self, instance: &Value) -> Result<(), Vec<String>> {
        if self.compiled.is_valid(instance) {
            return Ok(());
        }
        Err(self
            .compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect())
    }
}

impl fmt::Debug for SchemaCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCheck")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_reports_violations() {
        let schema = SchemaCheck::compile(&json!({"type": "integer"})).expect("compile");
        assert!(schema.check(&json!(5)).is_ok());
        let errors = schema.check(&json!("five")).expect_err("string is not an integer");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn compile_rejects_invalid_schema() {
        assert!(SchemaCheck::compile(&json!({"type": 12})).is_err());
    }
}
