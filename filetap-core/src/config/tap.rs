//! Top-level connector configuration.

use super::{DEFAULT_SFTP_PORT, TableSpec, TransportConfig};
use crate::{
    Result,
    error::TapError,
    models::parse_utc_timestamp,
    security::{Credentials, Secret},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Connector configuration as loaded from the JSON config file.
///
/// `tables` may be given either as a JSON array or as a string holding an
/// encoded JSON array.
///
/// # Example
/// ```rust
/// use filetap_core::config::TapConfig;
/// use serde_json::json;
///
/// let config = TapConfig::from_value(json!({
///     "start_date": "2020-01-01",
///     "local_root": "/srv/drop",
///     "tables": "[{\"table_name\": \"orders\", \"search_prefix\": \"/in\", \"search_pattern\": \"orders_.*\\\\.csv\"}]"
/// }))?;
///
/// assert_eq!(config.tables.len(), 1);
/// # Ok::<(), filetap_core::TapError>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TapConfig {
    /// Fallback checkpoint for tables without a bookmark
    #[serde(default)]
    pub start_date: Option<String>,
    /// Table specifications
    #[serde(deserialize_with = "deserialize_tables")]
    pub tables: Vec<TableSpec>,
    /// Root directory for the local transport
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// SFTP host
    #[serde(default)]
    pub host: Option<String>,
    /// SFTP port
    #[serde(default)]
    pub port: Option<u16>,
    /// SFTP username
    #[serde(default)]
    pub username: Option<String>,
    /// SFTP password
    #[serde(default)]
    pub password: Option<Secret>,
    /// SFTP private key file
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    /// Global gpg section, resolved lazily per file
    #[serde(default)]
    pub gpg_config: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TablesField {
    Encoded(String),
    List(Vec<TableSpec>),
}

fn deserialize_tables<'de, D>(deserializer: D) -> std::result::Result<Vec<TableSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    match TablesField::deserialize(deserializer)? {
        TablesField::List(tables) => Ok(tables),
        TablesField::Encoded(encoded) => {
            serde_json::from_str(&encoded).map_err(serde::de::Error::custom)
        }
    }
}

impl TapConfig {
    /// Reads, schema-validates and deserializes a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TapError::io(format!("Failed to read config file {}", path.display()), e)
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| TapError::Serialization {
            context: format!("Failed to parse config file {}", path.display()),
            source: e,
        })?;
        Self::from_value(value)
    }

    /// Schema-validates and deserializes an in-memory config.
    pub fn from_value(value: Value) -> Result<Self> {
        crate::validation::validate_config(&value).map_err(|e| {
            TapError::configuration(format!("Config validation failed: {}", e))
        })?;
        let config: TapConfig =
            serde_json::from_value(value).map_err(|e| TapError::Serialization {
                context: "Failed to deserialize config".to_string(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every table spec and the transport settings.
    ///
    /// # Errors
    /// Returns error if a table is invalid, `start_date` is unparseable or no
    /// transport is configured.
    pub fn validate(&self) -> Result<()> {
        for table in &self.tables {
            table.validate()?;
        }
        if let Some(start_date) = &self.start_date
            && parse_utc_timestamp(start_date).is_none()
        {
            return Err(TapError::configuration(format!(
                "start_date '{}' is not a valid timestamp",
                start_date
            )));
        }
        self.transport_config()?;
        Ok(())
    }

    /// Parsed `start_date`, if configured.
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date.as_deref().and_then(parse_utc_timestamp)
    }

    /// All table specs whose name equals `table_name`.
    pub fn tables_named<'a>(&'a self, table_name: &'a str) -> impl Iterator<Item = &'a TableSpec> {
        self.tables.iter().filter(move |t| t.table_name == table_name)
    }

    /// Builds the transport configuration; a local root wins over a host.
    pub fn transport_config(&self) -> Result<TransportConfig> {
        if let Some(root) = &self.local_root {
            return Ok(TransportConfig::Local { root: root.clone() });
        }
        match &self.host {
            Some(host) if !host.trim().is_empty() => Ok(TransportConfig::Sftp {
                host: host.clone(),
                port: self.port.unwrap_or(DEFAULT_SFTP_PORT),
                credentials: Credentials::new(
                    self.username.clone().unwrap_or_default(),
                    self.password.as_ref().map(|p| p.expose().to_string()),
                ),
                private_key_file: self.private_key_file.clone(),
            }),
            _ => Err(TapError::configuration(
                "Either local_root or host must be configured",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> Value {
        json!({
            "start_date": "2020-01-01",
            "local_root": "/srv/drop",
            "tables": [{
                "table_name": "orders",
                "search_prefix": "/in",
                "search_pattern": "orders_.*\\.csv",
                "delimiter": ",",
                "key_properties": ["id"]
            }]
        })
    }

    #[test]
    fn test_tables_as_array() {
        let config = TapConfig::from_value(base_config()).unwrap();
        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.tables[0].key_properties, vec!["id".to_string()]);
        assert_eq!(config.tables_named("orders").count(), 1);
        assert_eq!(config.tables_named("missing").count(), 0);
    }

    #[test]
    fn test_tables_as_encoded_string() {
        let mut value = base_config();
        let encoded = serde_json::to_string(&value["tables"]).unwrap();
        value["tables"] = json!(encoded);

        let config = TapConfig::from_value(value).unwrap();
        assert_eq!(config.tables[0].table_name, "orders");
    }

    #[test]
    fn test_start_date_parsed() {
        let config = TapConfig::from_value(base_config()).unwrap();
        assert_eq!(
            config.start_date().unwrap().to_rfc3339(),
            "2020-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_invalid_start_date_rejected() {
        let mut value = base_config();
        value["start_date"] = json!("last tuesday");
        assert!(TapConfig::from_value(value).is_err());
    }

    #[test]
    fn test_transport_required() {
        let mut value = base_config();
        value.as_object_mut().unwrap().remove("local_root");
        assert!(TapConfig::from_value(value).is_err());
    }

    #[test]
    fn test_disabled_gpg_section_does_not_fail_config() {
        let mut value = base_config();
        value["gpg_config"] = json!({
            "enable": false,
            "private_key": "/keys/private.asc",
            "uuid": "a@b"
        });
        value["tables"][0]["gpg_config"] = json!({"private_key": "/keys/other.asc"});

        let config = TapConfig::from_value(value).unwrap();
        assert!(crate::config::resolve_config(config.gpg_config.as_ref()).is_none());
    }

    #[test]
    fn test_sftp_transport_config() {
        let mut value = base_config();
        let obj = value.as_object_mut().unwrap();
        obj.remove("local_root");
        obj.insert("host".to_string(), json!("sftp.example.com"));
        obj.insert("username".to_string(), json!("drop"));
        obj.insert("password".to_string(), json!("pw"));

        let config = TapConfig::from_value(value).unwrap();
        let transport = config.transport_config().unwrap();
        assert_eq!(transport.to_string(), "sftp://sftp.example.com:22");
        assert!(!format!("{:?}", config).contains("\"pw\""));
    }
}
