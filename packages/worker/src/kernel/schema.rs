//! JSON Schema filters.
//!
//! Trigger filters, action input filters and action argument schemas are
//! all plain JSON Schema documents. `SchemaFilter` wraps the compiled
//! `jsonschema::Validator` and maps failures onto `WorkerError`.

use serde_json::Value;

use super::error::WorkerError;

#[derive(Debug)]
pub struct SchemaFilter {
    validator: jsonschema::Validator,
}

impl SchemaFilter {
    /// Compiles a schema.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidSchema`] if `schema` is not a valid
    /// JSON Schema document.
    pub fn compile(schema: &Value) -> Result<Self, WorkerError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| WorkerError::InvalidSchema {
                message: e.to_string(),
            })?;
        Ok(Self { validator })
    }

    pub fn is_match(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }

    /// Every validation error for `value`, rendered for logs.
    pub fn errors(&self, value: &Value) -> Vec<String> {
        self.validator
            .iter_errors(value)
            .map(|error| error.to_string())
            .collect()
    }

    /// Validates `value`, naming it `subject` in the resulting error.
    pub fn validate(&self, subject: &str, value: &Value) -> Result<(), WorkerError> {
        if self.is_match(value) {
            return Ok(());
        }
        Err(WorkerError::SchemaMismatch {
            subject: subject.to_string(),
            errors: self.errors(value),
        })
    }
}
