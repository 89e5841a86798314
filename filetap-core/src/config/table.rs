//! Per-table file discovery and parsing configuration.

use crate::{Result, error::TapError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_delimiter() -> String {
    ",".to_string()
}

/// Describes how to locate and parse the files of one output stream.
///
/// # Example
/// ```rust
/// use filetap_core::config::TableSpec;
///
/// let spec = TableSpec::new("orders", "/in", r"orders_.*\.csv")
///     .with_key_properties(vec!["id".to_string()]);
///
/// assert!(spec.validate().is_ok());
/// assert_eq!(spec.delimiter_byte().unwrap(), b',');
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Stream (table) name; matched against the catalog's `tap_stream_id`
    pub table_name: String,
    /// Directory to search under
    #[serde(default)]
    pub search_prefix: String,
    /// Regular expression matched (search semantics) against file paths
    pub search_pattern: String,
    /// Single-character field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Ordered field names forming the record key
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Text encoding of the files (utf-8 when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Per-table gpg section; takes precedence over the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_config: Option<Value>,
}

impl TableSpec {
    /// Creates a comma-delimited table spec.
    pub fn new(
        table_name: impl Into<String>,
        search_prefix: impl Into<String>,
        search_pattern: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            search_prefix: search_prefix.into(),
            search_pattern: search_pattern.into(),
            delimiter: default_delimiter(),
            key_properties: Vec::new(),
            encoding: None,
            gpg_config: None,
        }
    }

    /// Builder method to set the delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Builder method to set key properties.
    pub fn with_key_properties(mut self, key_properties: Vec<String>) -> Self {
        self.key_properties = key_properties;
        self
    }

    /// Builder method to set the file encoding.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Builder method to attach a table-level gpg section.
    pub fn with_gpg_config(mut self, gpg_config: Value) -> Self {
        self.gpg_config = Some(gpg_config);
        self
    }

    /// Validates the table specification.
    ///
    /// # Errors
    /// Returns error for an empty table name, an invalid search pattern or a
    /// delimiter that is not exactly one ASCII character.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(TapError::configuration("table_name cannot be empty"));
        }
        self.compiled_pattern()?;
        self.delimiter_byte()?;
        Ok(())
    }

    /// Compiles `search_pattern`.
    pub fn compiled_pattern(&self) -> Result<Regex> {
        Regex::new(&self.search_pattern).map_err(|e| {
            TapError::configuration(format!(
                "Invalid search_pattern for table '{}': {}",
                self.table_name, e
            ))
        })
    }

    /// The delimiter as the single byte the parser expects.
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(TapError::configuration(format!(
                "Delimiter for table '{}' must be a single ASCII character, got {:?}",
                self.table_name, self.delimiter
            ))),
        }
    }

    /// Encoding name with the utf-8 default applied.
    pub fn encoding_or_default(&self) -> &str {
        self.encoding.as_deref().unwrap_or("utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_with_defaults() {
        let spec: TableSpec = serde_json::from_value(json!({
            "table_name": "orders",
            "search_prefix": "/in",
            "search_pattern": "orders_.*\\.csv"
        }))
        .unwrap();

        assert_eq!(spec.delimiter, ",");
        assert!(spec.key_properties.is_empty());
        assert_eq!(spec.encoding_or_default(), "utf-8");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_tab_delimiter() {
        let spec = TableSpec::new("t", "", ".*").with_delimiter("\t");
        assert_eq!(spec.delimiter_byte().unwrap(), b'\t');
    }

    #[test]
    fn test_invalid_specs() {
        assert!(TableSpec::new("", "/in", ".*").validate().is_err());
        assert!(TableSpec::new("t", "/in", "orders_(").validate().is_err());
        assert!(
            TableSpec::new("t", "/in", ".*")
                .with_delimiter("||")
                .validate()
                .is_err()
        );
        assert!(
            TableSpec::new("t", "/in", ".*")
                .with_delimiter("")
                .validate()
                .is_err()
        );
    }
}
