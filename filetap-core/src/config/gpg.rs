//! GnuPG decryption settings.
//!
//! A gpg section is optional. Only a well-formed section whose `enable`
//! flag is literally `true` turns the decrypt stage on; every other shape
//! leaves decryption disabled without raising an error.

use super::TableSpec;
use crate::security::Secret;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};

/// GnuPG home used when the section does not name one.
pub const DEFAULT_GNUPG_HOME: &str = "/gpg/.gnupg";

/// Parameters needed to import the private key and decrypt files.
#[derive(Debug, Clone, Deserialize)]
pub struct GpgParams {
    /// Explicit enable flag; must be `true` for decryption to run
    #[serde(default)]
    pub enable: bool,
    /// Passphrase protecting the private key
    #[serde(default)]
    pub passphrase: Option<Secret>,
    /// ASCII-armored private key block
    pub private_key: Secret,
    /// Identity (email or name fragment) used to find the key for the
    /// expiration check
    pub uuid: String,
    /// Keyring directory
    #[serde(default)]
    pub gnupghome: Option<PathBuf>,
}

impl GpgParams {
    /// Passphrase as plain text, if one is configured.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(Secret::expose)
    }

    /// Keyring directory, falling back to [`DEFAULT_GNUPG_HOME`].
    pub fn gnupghome(&self) -> PathBuf {
        self.gnupghome
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GNUPG_HOME))
    }
}

/// Resolves a raw gpg section into decrypt parameters.
///
/// Returns `Some` only when the section exists, is well-formed and carries
/// `"enable": true`. Absence is the normal path and is not logged above
/// DEBUG; a malformed enabled section is logged at WARN.
pub fn resolve_config(raw: Option<&Value>) -> Option<GpgParams> {
    let section = raw?;
    let enabled = section
        .get("enable")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !enabled {
        debug!("gpg_config present but not enabled");
        return None;
    }

    match GpgParams::deserialize(section) {
        Ok(params) if params.uuid.trim().is_empty() => {
            warn!("gpg_config is enabled but has an empty uuid; decryption disabled");
            None
        }
        Ok(params) => Some(params),
        Err(e) => {
            warn!("gpg_config is enabled but malformed ({}); decryption disabled", e);
            None
        }
    }
}

/// Resolves the effective gpg section for a table.
///
/// A table-level section replaces the global one entirely, so a table can
/// opt out with `{"enable": false}`.
pub fn resolve_for_table(global: Option<&Value>, table: &TableSpec) -> Option<GpgParams> {
    resolve_config(table.gpg_config.as_ref().or(global))
}
