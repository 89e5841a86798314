//! JSON Schema validation for connector inputs.
//!
//! The config file and catalog are checked against embedded JSON Schemas
//! before they are deserialized, so shape errors are reported with the
//! offending field instead of a generic serde message.
//!
//! # Example
//! ```rust
//! use filetap_core::validation::validate_config;
//! use serde_json::json;
//!
//! let config = json!({
//!     "start_date": "2020-01-01",
//!     "local_root": "/srv/drop",
//!     "tables": []
//! });
//!
//! validate_config(&config)?;
//! # Ok::<(), filetap_core::validation::ValidationError>(())
//! ```

use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// JSON Schema validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// Validation failed with specific field errors
    #[error("Schema validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },
}

/// Embedded JSON Schema for the connector config file
const CONFIG_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "filetap connector configuration",
  "type": "object",
  "required": ["tables"],
  "properties": {
    "start_date": { "type": "string", "minLength": 1 },
    "tables": {
      "oneOf": [
        { "type": "string" },
        { "type": "array", "items": { "$ref": "#/$defs/table" } }
      ]
    },
    "local_root": { "type": "string", "minLength": 1 },
    "host": { "type": "string" },
    "port": { "type": "integer", "minimum": 1, "maximum": 65535 },
    "username": { "type": "string" },
    "password": { "type": "string" },
    "private_key_file": { "type": "string" },
    "gpg_config": {}
  },
  "$defs": {
    "table": {
      "type": "object",
      "required": ["table_name", "search_pattern"],
      "properties": {
        "table_name": { "type": "string", "minLength": 1 },
        "search_prefix": { "type": "string" },
        "search_pattern": { "type": "string" },
        "delimiter": { "type": "string", "minLength": 1, "maxLength": 1 },
        "key_properties": { "type": "array", "items": { "type": "string" } },
        "encoding": { "type": ["string", "null"] },
        "gpg_config": {}
      }
    }
  }
}"##;

/// Embedded JSON Schema for the catalog file
const CATALOG_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "filetap catalog",
  "type": "object",
  "required": ["streams"],
  "properties": {
    "streams": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["tap_stream_id", "schema"],
        "properties": {
          "tap_stream_id": { "type": "string", "minLength": 1 },
          "stream": { "type": "string" },
          "schema": { "type": "object" },
          "key_properties": { "type": "array", "items": { "type": "string" } },
          "metadata": {
            "type": "array",
            "items": {
              "type": "object",
              "required": ["metadata"],
              "properties": {
                "breadcrumb": { "type": "array", "items": { "type": "string" } },
                "metadata": { "type": "object" }
              }
            }
          }
        }
      }
    }
  }
}"##;

static COMPILED_CONFIG_SCHEMA: OnceLock<Validator> = OnceLock::new();
static COMPILED_CATALOG_SCHEMA: OnceLock<Validator> = OnceLock::new();

fn compile(source: &str, name: &str) -> Result<Validator, ValidationError> {
    let schema_json: Value =
        serde_json::from_str(source).map_err(|e| ValidationError::SchemaCompilation {
            message: format!("Failed to parse embedded {} schema: {}", name, e),
        })?;

    jsonschema::validator_for(&schema_json).map_err(|e| ValidationError::SchemaCompilation {
        message: format!("{} schema compilation error: {}", name, e),
    })
}

fn compiled(
    cell: &'static OnceLock<Validator>,
    source: &str,
    name: &str,
) -> Result<&'static Validator, ValidationError> {
    if let Some(validator) = cell.get() {
        return Ok(validator);
    }
    let validator = compile(source, name)?;
    // Another thread may have won the race; either copy is equivalent
    let _ = cell.set(validator);
    cell.get().ok_or_else(|| ValidationError::SchemaCompilation {
        message: format!("{} schema validator unavailable", name),
    })
}

/// Compiles the embedded schemas up front.
///
/// Validation compiles lazily as well; calling this at startup surfaces a
/// broken embedded schema before any work is done.
pub fn initialize_validators() -> Result<(), ValidationError> {
    compiled(&COMPILED_CONFIG_SCHEMA, CONFIG_SCHEMA, "config")?;
    compiled(&COMPILED_CATALOG_SCHEMA, CATALOG_SCHEMA, "catalog")?;
    Ok(())
}

fn run(validator: &Validator, value: &Value) -> Result<(), ValidationError> {
    if let Err(validation_error) = validator.validate(value) {
        return Err(ValidationError::ValidationFailed {
            error_count: 1,
            errors: vec![validation_error.to_string()],
        });
    }
    Ok(())
}

/// Validates a config document.
///
/// gpg sections are not inspected here; they are resolved per table at
/// sync time, where a disabled or malformed section is simply ignored.
///
/// # Errors
/// Returns `ValidationFailed` for shape errors.
pub fn validate_config(value: &Value) -> Result<(), ValidationError> {
    let validator = compiled(&COMPILED_CONFIG_SCHEMA, CONFIG_SCHEMA, "config")?;
    run(validator, value)
}

/// Validates a catalog document.
pub fn validate_catalog(value: &Value) -> Result<(), ValidationError> {
    let validator = compiled(&COMPILED_CATALOG_SCHEMA, CATALOG_SCHEMA, "catalog")?;
    run(validator, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initialize_validators() {
        assert!(initialize_validators().is_ok());
        // Idempotent
        assert!(initialize_validators().is_ok());
    }

    #[test]
    fn test_valid_config() {
        let config = json!({
            "start_date": "2020-01-01",
            "local_root": "/srv/drop",
            "tables": [{
                "table_name": "orders",
                "search_prefix": "/in",
                "search_pattern": "orders_.*\\.csv",
                "delimiter": ",",
                "key_properties": ["id"]
            }]
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_missing_tables() {
        let config = json!({"start_date": "2020-01-01"});
        let result = validate_config(&config);
        assert!(matches!(
            result,
            Err(ValidationError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_config_bad_delimiter() {
        let config = json!({
            "tables": [{
                "table_name": "orders",
                "search_pattern": ".*",
                "delimiter": ";;"
            }]
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_disabled_gpg_section_with_key_path_is_accepted() {
        let config = json!({
            "tables": [],
            "gpg_config": {
                "enable": false,
                "private_key": "/keys/private.asc",
                "uuid": "ops@example.com"
            }
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_catalog_validation() {
        let catalog = json!({
            "streams": [{
                "tap_stream_id": "orders",
                "schema": {"type": "object", "properties": {}},
                "metadata": [{"breadcrumb": [], "metadata": {"selected": true}}]
            }]
        });
        assert!(validate_catalog(&catalog).is_ok());

        let catalog = json!({"streams": [{"schema": {}}]});
        assert!(validate_catalog(&catalog).is_err());
    }
}
