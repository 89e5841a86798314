//! Key lifecycle: import, expiration check and decryption.
//!
//! One [`KeyLifecycleManager`] is built per process around a [`Keyring`]
//! and shared by reference with the sync pipeline.

use super::keyring::{KeyListing, Keyring};
use crate::{
    Result,
    error::TapError,
    models::{ImportedKeyMetadata, KeyIdentity, KeyKind, KeyRecord},
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Timestamp layout used in expiration errors.
const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Attributes pulled out of a keyring listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAttribute {
    /// Expiration of the primary key
    Expires,
    /// User ids, split into name and email
    Uids,
}

/// Formatted value of a [`KeyAttribute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// `None` for keys that never expire
    Expires(Option<DateTime<Utc>>),
    /// Parsed user ids
    Uids(Vec<KeyIdentity>),
}

impl KeyAttribute {
    /// Every attribute, in lookup order.
    pub const ALL: [KeyAttribute; 2] = [KeyAttribute::Expires, KeyAttribute::Uids];

    /// Extracts and formats this attribute from a listed key.
    pub fn extract(self, key: &KeyListing) -> AttributeValue {
        match self {
            KeyAttribute::Expires => AttributeValue::Expires(
                key.expires
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            ),
            KeyAttribute::Uids => {
                AttributeValue::Uids(key.uids.iter().map(|uid| KeyIdentity::parse(uid)).collect())
            }
        }
    }
}

/// Client for the keyring used by the decrypt stage.
#[derive(Clone)]
pub struct KeyLifecycleManager {
    keyring: Arc<dyn Keyring>,
}

impl std::fmt::Debug for KeyLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLifecycleManager")
            .field("keyring", &self.keyring.describe())
            .finish()
    }
}

impl KeyLifecycleManager {
    /// Creates a manager over `keyring`.
    pub fn new(keyring: Arc<dyn Keyring>) -> Self {
        Self { keyring }
    }

    /// Imports an armored key block into the keyring.
    ///
    /// Re-importing a key that is already present is reported by the
    /// keyring as "Not actually changed" and is accepted.
    ///
    /// # Errors
    /// Returns `TapError::KeyImport` if the block lacks the armor header for
    /// `kind`, or if the keyring rejects the key.
    pub async fn import_key(
        &self,
        armored: &str,
        passphrase: Option<&str>,
        kind: KeyKind,
    ) -> Result<KeyRecord> {
        if !armored.contains(kind.armor_header()) {
            return Err(TapError::key_import("no valid key found to import"));
        }

        let records = self
            .keyring
            .import_keys(armored, passphrase)
            .await
            .map_err(|e| TapError::key_import(format!("keyring import failed: {}", e)))?;

        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| TapError::key_import("keyring reported no import results"))?;

        if record.ok {
            info!("Imported {} key", kind);
        } else if record.is_unchanged() {
            debug!("{} key already present in keyring", kind);
        } else {
            return Err(TapError::key_import(record.text.trim_end().to_string()));
        }
        Ok(record)
    }

    /// Finds the first key with a user id containing `identity`.
    pub async fn lookup_key_metadata(
        &self,
        identity: &str,
    ) -> Result<Option<ImportedKeyMetadata>> {
        let keys = self.keyring.list_keys().await?;
        let Some(key) = keys
            .iter()
            .find(|key| key.uids.iter().any(|uid| uid.contains(identity)))
        else {
            return Ok(None);
        };

        let mut metadata = ImportedKeyMetadata {
            fingerprint: key.fingerprint.clone(),
            expires: None,
            identities: Vec::new(),
        };
        for attribute in KeyAttribute::ALL {
            match attribute.extract(key) {
                AttributeValue::Expires(expires) => metadata.expires = expires,
                AttributeValue::Uids(identities) => metadata.identities = identities,
            }
        }
        Ok(Some(metadata))
    }

    /// Checks that the key for `identity` has not expired.
    pub async fn verify_not_expired(&self, identity: &str) -> Result<()> {
        self.verify_not_expired_at(identity, Utc::now()).await
    }

    /// Same as [`verify_not_expired`](Self::verify_not_expired) against an
    /// explicit clock. A key expiring exactly at `now` is expired.
    pub async fn verify_not_expired_at(&self, identity: &str, now: DateTime<Utc>) -> Result<()> {
        let metadata = self
            .lookup_key_metadata(identity)
            .await
            .map_err(|e| {
                TapError::key_expiration(format!("could not verify certificate validity: {}", e))
            })?
            .ok_or_else(|| TapError::key_expiration("could not verify certificate validity"))?;

        match metadata.expires {
            None => Ok(()),
            Some(expires) if expires > now => Ok(()),
            Some(expires) => Err(TapError::key_expiration(format!(
                "certificate expired at: {}",
                expires.format(EXPIRY_FORMAT)
            ))),
        }
    }

    /// Decrypts armored ciphertext to UTF-8 text.
    ///
    /// # Errors
    /// Returns `TapError::GpgDecrypt` with the keyring's diagnostics when
    /// decryption fails, and when the plaintext is not valid UTF-8.
    pub async fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Result<String> {
        let outcome = self
            .keyring
            .decrypt(ciphertext, passphrase)
            .await
            .map_err(|e| TapError::gpg_decrypt(format!("keyring decrypt failed: {}", e)))?;

        if !outcome.ok {
            return Err(TapError::gpg_decrypt(outcome.diagnostics));
        }
        String::from_utf8(outcome.data)
            .map_err(|e| TapError::gpg_decrypt(format!("decrypted data is not valid UTF-8: {}", e)))
    }
}
