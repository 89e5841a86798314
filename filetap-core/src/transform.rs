//! Schema-driven record transformation.
//!
//! Parsed rows are all strings. A [`Transformer`] built from a stream's
//! JSON schema and metadata keeps only selected schema properties, coerces
//! each value to the first schema type it converts to, and validates the
//! result against the schema.

use crate::models::{MetadataMap, parse_utc_timestamp};
use chrono::SecondsFormat;
use jsonschema::Validator;
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while transforming a record.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The stream schema is not a usable JSON Schema
    #[error("invalid stream schema: {message}")]
    InvalidSchema { message: String },

    /// The record is not a JSON object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// The transformed record does not conform to the schema
    #[error("record does not match schema: {message}")]
    Validation { message: String },
}

/// Target type candidate taken from a property schema.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    Integer,
    Number,
    Boolean,
    DateTime,
    String,
    Object,
    Array,
}

impl Candidate {
    fn from_schema(schema: &Value) -> Vec<Candidate> {
        if let Some(any_of) = schema.get("anyOf").and_then(Value::as_array) {
            return any_of.iter().flat_map(Candidate::from_schema).collect();
        }
        let is_date_time = schema.get("format").and_then(Value::as_str) == Some("date-time");
        let types: Vec<&str> = match schema.get("type") {
            Some(Value::String(t)) => vec![t.as_str()],
            Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        types
            .into_iter()
            .filter_map(|t| match t {
                "integer" => Some(Candidate::Integer),
                "number" => Some(Candidate::Number),
                "boolean" => Some(Candidate::Boolean),
                "string" if is_date_time => Some(Candidate::DateTime),
                "string" => Some(Candidate::String),
                "object" => Some(Candidate::Object),
                "array" => Some(Candidate::Array),
                _ => None,
            })
            .collect()
    }

    fn convert(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Candidate::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Some(value.clone())
            }
            (Candidate::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(Value::from)
            }
            (Candidate::Number, Value::Number(_)) => Some(value.clone()),
            (Candidate::Number, Value::String(s)) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Some(Value::from(i));
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
            (Candidate::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Candidate::Boolean, Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "1" => Some(Value::Bool(true)),
                    "false" | "f" | "0" => Some(Value::Bool(false)),
                    _ => None,
                }
            }
            (Candidate::DateTime, Value::String(s)) => parse_utc_timestamp(s)
                .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))),
            (Candidate::String, Value::String(_)) => Some(value.clone()),
            (Candidate::Object, Value::Object(_)) | (Candidate::Array, Value::Array(_)) => {
                Some(value.clone())
            }
            (Candidate::Object, Value::String(s)) => serde_json::from_str::<Value>(s)
                .ok()
                .filter(Value::is_object),
            (Candidate::Array, Value::String(s)) => serde_json::from_str::<Value>(s)
                .ok()
                .filter(Value::is_array),
            _ => None,
        }
    }
}

/// Converts one value for a property schema. Values no candidate accepts
/// are returned unchanged so validation reports them.
fn coerce(value: Value, property_schema: &Value) -> Value {
    if value.is_null() {
        return value;
    }
    Candidate::from_schema(property_schema)
        .iter()
        .find_map(|candidate| candidate.convert(&value))
        .unwrap_or(value)
}

/// Transforms records of one stream.
pub struct Transformer {
    properties: Map<String, Value>,
    excluded: BTreeSet<String>,
    validator: Validator,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("excluded", &self.excluded)
            .finish()
    }
}

impl Transformer {
    /// Compiles the stream schema and reads field selection from metadata.
    ///
    /// A field is excluded when its `["properties", name]` metadata has
    /// `selected: false` or `inclusion: "unsupported"`.
    pub fn new(schema: &Value, metadata: &MetadataMap) -> Result<Self, TransformError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| TransformError::InvalidSchema {
                message: e.to_string(),
            })?;
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let excluded = metadata
            .iter()
            .filter_map(|(breadcrumb, entry)| match breadcrumb.as_slice() {
                [kind, field] if kind == "properties" => Some((field, entry)),
                _ => None,
            })
            .filter(|(_, entry)| {
                entry.get("selected") == Some(&Value::Bool(false))
                    || entry.get("inclusion").and_then(Value::as_str) == Some("unsupported")
            })
            .map(|(field, _)| field.clone())
            .collect();

        Ok(Self {
            properties,
            excluded,
            validator,
        })
    }

    /// Filters, coerces and validates one record.
    pub fn transform(&self, record: Value) -> Result<Value, TransformError> {
        let Value::Object(fields) = record else {
            return Err(TransformError::NotAnObject);
        };

        let mut out = Map::with_capacity(fields.len());
        for (name, value) in fields {
            if self.excluded.contains(&name) {
                continue;
            }
            let Some(property_schema) = self.properties.get(&name) else {
                continue;
            };
            out.insert(name, coerce(value, property_schema));
        }

        let out = Value::Object(out);
        if let Err(e) = self.validator.validate(&out) {
            return Err(TransformError::Validation {
                message: e.to_string(),
            });
        }
        Ok(out)
    }
}
