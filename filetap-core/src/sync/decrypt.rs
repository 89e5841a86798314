//! Optional decryption of a file before parsing.

use crate::{
    Result,
    config::GpgParams,
    error::TapError,
    models::KeyKind,
    security::KeyLifecycleManager,
    transport::FileHandle,
};
use std::io::{Read, Seek, Write};
use tracing::{debug, warn};

/// Imports the configured private key and checks it has not expired.
///
/// Runs before any file content is read.
pub async fn prepare_keys(keys: &KeyLifecycleManager, params: &GpgParams) -> Result<()> {
    keys.import_key(
        params.private_key.expose(),
        params.passphrase(),
        KeyKind::Private,
    )
    .await?;
    keys.verify_not_expired(&params.uuid).await?;
    debug!("Private key for {} is valid", params.uuid);
    Ok(())
}

/// Decrypts an armored file and returns a handle over the plaintext.
///
/// The plaintext lives in an anonymous temp file that is removed when the
/// handle is dropped. Empty plaintext yields an empty handle, so the file
/// contributes no records.
///
/// # Errors
/// Returns `TapError::GpgDecrypt` when the content is not armored text or
/// cannot be decrypted.
pub async fn decrypt_file(
    mut handle: FileHandle,
    keys: &KeyLifecycleManager,
    params: &GpgParams,
    file_name: &str,
) -> Result<FileHandle> {
    let mut ciphertext = String::new();
    handle.read_to_string(&mut ciphertext).map_err(|e| {
        TapError::gpg_decrypt(format!("could not read {} as armored text: {}", file_name, e))
    })?;

    let plaintext = keys
        .decrypt(&ciphertext, params.passphrase().unwrap_or_default())
        .await?;

    let mut file = tempfile::tempfile()
        .map_err(|e| TapError::io("Failed to create temp file for plaintext", e))?;
    if plaintext.is_empty() {
        warn!("Decrypted {} is empty; no records will be synced from it", file_name);
    } else {
        file.write_all(plaintext.as_bytes())
            .map_err(|e| TapError::io("Failed to write plaintext", e))?;
    }
    file.rewind()
        .map_err(|e| TapError::io("Failed to rewind plaintext", e))?;
    Ok(Box::new(file))
}
