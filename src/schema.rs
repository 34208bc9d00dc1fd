//! Schema compilation and structured validation errors.
//!
//! A table's schema is compiled once at table-open time; every write is then
//! checked against the compiled form. Rejections carry the per-field
//! violations so callers can branch on what failed, not just on a message.

use jsonschema::Validator;
use serde_json::Value;

use crate::error::{Error, FieldViolation, Result};

/// A schema document compiled to a validating predicate.
#[derive(Debug)]
pub struct CompiledSchema {
    document: Value,
    validator: Validator,
}

impl CompiledSchema {
    /// Compile a schema document.
    ///
    /// Fails with [`Error::MalformedSchema`] if the document is not a valid
    /// schema.
    pub fn compile(document: Value) -> Result<Self> {
        let validator = jsonschema::options()
            .build(&document)
            .map_err(|e| Error::MalformedSchema(e.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    /// The original schema document this was compiled from.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Check `value`, returning every violated constraint on failure.
    pub fn check(&self, value: &Value) -> Result<()> {
        let violations: Vec<FieldViolation> = self
            .validator
            .iter_errors(value)
            .map(|err| FieldViolation {
                path: err.instance_path().to_string(),
                message: err.to_string(),
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_valid_value() {
        let schema = CompiledSchema::compile(json!({
            "properties": {
                "smaller": { "type": "number", "maximum": 5 }
            }
        }))
        .unwrap();

        schema.check(&json!({ "smaller": 4.99 })).unwrap();
        // Fields outside the schema are allowed
        schema.check(&json!({ "joe": "blow" })).unwrap();
    }

    #[test]
    fn test_reports_field_path() {
        let schema = CompiledSchema::compile(json!({
            "properties": {
                "smaller": { "type": "number", "maximum": 5 }
            }
        }))
        .unwrap();

        let err = schema.check(&json!({ "smaller": "blow" })).unwrap_err();
        match err {
            Error::Validation(violations) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].path, "/smaller");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_collects_all_violations() {
        let schema = CompiledSchema::compile(json!({
            "required": ["a", "b"],
            "properties": {
                "a": { "type": "string" },
                "b": { "type": "number" }
            }
        }))
        .unwrap();

        let err = schema.check(&json!({ "a": 1 })).unwrap_err();
        match err {
            Error::Validation(violations) => assert!(violations.len() >= 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_schema() {
        let err = CompiledSchema::compile(json!({
            "properties": { "x": { "type": "no-such-type" } }
        }))
        .unwrap_err();
        assert!(matches!(err, Error::MalformedSchema(_)));
    }
}
