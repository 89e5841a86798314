//! Keyring capability contract.
//!
//! The key lifecycle manager never talks to GnuPG directly; it drives a
//! [`Keyring`] so the import / list / decrypt contract can be backed by the
//! gpg CLI in production and by in-memory fakes in tests.

use crate::{Result, models::KeyRecord};
use async_trait::async_trait;

/// One key as listed by the keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyListing {
    /// Primary key fingerprint
    pub fingerprint: String,
    /// Expiration as seconds since the Unix epoch; `None` never expires
    pub expires: Option<i64>,
    /// Raw user ids, typically `Name <email>`
    pub uids: Vec<String>,
}

/// Raw result of a decrypt call.
#[derive(Debug, Clone, Default)]
pub struct DecryptOutcome {
    /// True when the keyring reports a successful decryption
    pub ok: bool,
    /// Plaintext bytes
    pub data: Vec<u8>,
    /// Diagnostic output of the keyring (stderr for gpg)
    pub diagnostics: String,
}

/// Key store operations needed by the decrypt pipeline.
///
/// # Object Safety
/// This trait is object-safe, allowing `Arc<dyn Keyring>`.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Imports an armored key block. Returns one record per key reported
    /// by the keyring; never empty on success.
    ///
    /// # Errors
    /// Returns `TapError::Keyring` when the keyring cannot be driven at all.
    async fn import_keys(&self, armored: &str, passphrase: Option<&str>)
    -> Result<Vec<KeyRecord>>;

    /// Lists all public keys in the keyring.
    async fn list_keys(&self) -> Result<Vec<KeyListing>>;

    /// Decrypts armored ciphertext with the given passphrase.
    ///
    /// A wrong passphrase or corrupt input is reported through
    /// `DecryptOutcome::ok`, not as an error.
    async fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Result<DecryptOutcome>;

    /// Human readable description of the backend (never includes secrets).
    fn describe(&self) -> String;
}
