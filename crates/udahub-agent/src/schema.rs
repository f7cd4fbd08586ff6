//! JSON Schema contracts for tool arguments and structured answers

use std::{fmt, sync::Arc};

use crate::error::{Error, Result};

/// A named JSON schema with its compiled validator
#[derive(Clone)]
pub struct ResponseSchema {
    name: String,
    schema: serde_json::Value,
    validator: Arc<jsonschema::Validator>,
}

impl ResponseSchema {
    /// Compile a schema. Fails if the schema itself is malformed.
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Result<Self> {
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| Error::Other(format!("invalid response schema: {}", e)))?;
        Ok(Self {
            name: name.into(),
            schema,
            validator: Arc::new(validator),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    /// Check a candidate answer
    pub fn validate(&self, value: &serde_json::Value) -> Result<()> {
        match validate_with_validator(value, &self.validator) {
            None => Ok(()),
            Some(errors) => Err(Error::SchemaViolation(errors)),
        }
    }

    /// Provider-level representation of this contract
    pub fn to_response_format(&self) -> udahub_ai::ResponseFormat {
        udahub_ai::ResponseFormat {
            name: self.name.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl fmt::Debug for ResponseSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSchema")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Validate a value using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
pub fn validate_with_validator(
    value: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(errors.join("\n"))
    }
}

/// Validate tool arguments against a JSON Schema (compiles on each call).
///
/// Returns `Some(error_message)` if validation fails. A schema that does not
/// compile validates nothing and returns `None`.
pub fn validate_tool_args(args: &serde_json::Value, schema: &serde_json::Value) -> Option<String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(_) => return None,
    };
    validate_with_validator(args, &validator)
        .map(|errors| format!("Tool argument validation failed:\n{}", errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "experience_id": { "type": "string" },
                "date": { "type": "string" },
                "party_size": { "type": "integer", "minimum": 1 }
            },
            "required": ["experience_id", "date", "party_size"]
        })
    }

    #[test]
    fn test_validate_args_valid() {
        let args = serde_json::json!({"experience_id": "e1", "date": "2025-06-01", "party_size": 2});
        assert!(validate_tool_args(&args, &reservation_schema()).is_none());
    }

    #[test]
    fn test_validate_args_missing_required() {
        let args = serde_json::json!({"experience_id": "e1"});
        let err = validate_tool_args(&args, &reservation_schema()).unwrap();
        assert!(err.contains("date"));
        assert!(err.contains("party_size"));
    }

    #[test]
    fn test_validate_args_wrong_type() {
        let args = serde_json::json!({"experience_id": "e1", "date": "x", "party_size": "two"});
        let err = validate_tool_args(&args, &reservation_schema()).unwrap();
        assert!(err.contains("/party_size"));
    }

    #[test]
    fn test_validate_args_invalid_schema_returns_none() {
        let bad_schema = serde_json::json!({"type": "not-a-type"});
        assert!(validate_tool_args(&serde_json::json!({}), &bad_schema).is_none());
    }

    #[test]
    fn test_response_schema_validate() {
        let schema = ResponseSchema::new(
            "answer",
            serde_json::json!({
                "type": "object",
                "properties": { "worker": { "type": "string" } },
                "required": ["worker"]
            }),
        )
        .unwrap();

        assert!(schema.validate(&serde_json::json!({"worker": "faq"})).is_ok());
        let err = schema.validate(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
        assert_eq!(schema.to_response_format().name, "answer");
    }

    #[test]
    fn test_response_schema_rejects_malformed_schema() {
        assert!(ResponseSchema::new("bad", serde_json::json!({"type": 12})).is_err());
    }
}
