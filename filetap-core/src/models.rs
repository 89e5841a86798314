//! Core data models shared by the sync pipeline.
//!
//! Files, key lifecycle results and catalog entries. Timestamps are always
//! UTC; bookmarks are stored as RFC 3339 strings with a `Z` suffix.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A remote file matched by a table's search pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Path as reported by the transport (used for provenance)
    pub filepath: String,
    /// Last modification time of the file
    pub last_modified: DateTime<Utc>,
}

impl FileDescriptor {
    /// Creates a descriptor for a listed file.
    pub fn new(filepath: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            filepath: filepath.into(),
            last_modified,
        }
    }

    /// Value written to the `modified_since` bookmark once this file is done.
    pub fn bookmark_value(&self) -> String {
        format_bookmark(&self.last_modified)
    }
}

/// Formats a timestamp the way bookmarks store it.
///
/// Whole seconds render without a fraction (`2020-01-02T00:00:00Z`);
/// sub-second precision is kept so a resumed run never re-selects the file.
pub fn format_bookmark(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses a bookmark or `start_date` value into a UTC timestamp.
///
/// Accepts RFC 3339, naive `YYYY-mm-ddTHH:MM:SS[.f]` (taken as UTC) and a
/// bare `YYYY-mm-dd` date (UTC midnight).
pub fn parse_utc_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Kind of armored key block being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Private,
    Public,
}

impl KeyKind {
    /// Armor header that must be present in a key block of this kind.
    pub fn armor_header(self) -> &'static str {
        match self {
            KeyKind::Private => "BEGIN PGP PRIVATE KEY BLOCK",
            KeyKind::Public => "BEGIN PGP PUBLIC KEY BLOCK",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::Private => write!(f, "private"),
            KeyKind::Public => write!(f, "public"),
        }
    }
}

/// Diagnostic text the keyring reports when a key was already present.
pub const NOT_CHANGED_TEXT: &str = "Not actually changed";

/// Result of importing one armored key block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// True when the keyring reports the import as a change
    pub ok: bool,
    /// Keyring diagnostic (reason text)
    pub text: String,
    /// Fingerprint of the imported key, if reported
    pub fingerprint: Option<String>,
}

impl KeyRecord {
    /// True when a failed-looking import is only an idempotent re-import.
    pub fn is_unchanged(&self) -> bool {
        !self.ok && self.text.trim_end() == NOT_CHANGED_TEXT
    }
}

/// A `Name <email>` user id split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIdentity {
    /// Display name part of the user id
    pub name: String,
    /// Address between `<` and `>`
    pub email: Option<String>,
}

impl KeyIdentity {
    /// Splits a user id at the first `<`; the email is whatever sits
    /// between it and the closing `>`.
    pub fn parse(uid: &str) -> Self {
        match uid.split_once('<') {
            Some((name, email)) => Self {
                name: name.trim().to_string(),
                email: Some(email.trim_end().trim_end_matches('>').to_string()),
            },
            None => Self {
                name: uid.trim().to_string(),
                email: None,
            },
        }
    }
}

/// Key attributes looked up from the keyring for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedKeyMetadata {
    /// Primary key fingerprint
    pub fingerprint: String,
    /// Expiration time; `None` means the key never expires
    pub expires: Option<DateTime<Utc>>,
    /// Parsed user ids
    pub identities: Vec<KeyIdentity>,
}

/// One `{breadcrumb, metadata}` entry of a catalog stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(default)]
    pub breadcrumb: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Metadata entries keyed by breadcrumb.
pub type MetadataMap = BTreeMap<Vec<String>, Map<String, Value>>;

/// A catalog stream: the unit `sync_stream` is invoked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream id, also the table name
    pub tap_stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// JSON Schema of the records
    pub schema: Value,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default)]
    pub key_properties: Vec<String>,
}

impl StreamDescriptor {
    /// Creates a stream with no metadata and no key properties.
    pub fn new(tap_stream_id: impl Into<String>, schema: Value) -> Self {
        Self {
            tap_stream_id: tap_stream_id.into(),
            stream: None,
            schema,
            metadata: Vec::new(),
            key_properties: Vec::new(),
        }
    }

    /// Builder method to set key properties.
    pub fn with_key_properties(mut self, key_properties: Vec<String>) -> Self {
        self.key_properties = key_properties;
        self
    }

    /// Builder method to append a metadata entry.
    pub fn with_metadata(mut self, breadcrumb: Vec<String>, metadata: Map<String, Value>) -> Self {
        self.metadata.push(MetadataEntry {
            breadcrumb,
            metadata,
        });
        self
    }

    /// Metadata keyed by breadcrumb; later entries win on duplicates.
    pub fn metadata_map(&self) -> MetadataMap {
        self.metadata
            .iter()
            .map(|entry| (entry.breadcrumb.clone(), entry.metadata.clone()))
            .collect()
    }

    /// Whether the stream should be synced.
    ///
    /// Root metadata `selected` wins, then `selected-by-default`; a stream
    /// without any metadata is selected.
    pub fn is_selected(&self) -> bool {
        let root = self
            .metadata
            .iter()
            .rev()
            .find(|entry| entry.breadcrumb.is_empty());
        match root {
            Some(entry) => entry
                .metadata
                .get("selected")
                .or_else(|| entry.metadata.get("selected-by-default"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            None => self.metadata.is_empty(),
        }
    }
}

/// A Singer catalog: the list of streams available for sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub streams: Vec<StreamDescriptor>,
}

impl Catalog {
    /// Streams selected for this run, in catalog order.
    pub fn selected_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.is_selected())
    }
}
