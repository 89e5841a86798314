//! GnuPG keyring backend.
//!
//! Shells out to the `gpg` CLI in batch mode. Passphrases are written to the
//! child's stdin (`--passphrase-fd 0`) ahead of the payload and never appear
//! on the command line. Machine-readable output (`--status-fd`,
//! `--with-colons`) is parsed by the pure functions at the bottom of this
//! module.

use super::keyring::{DecryptOutcome, KeyListing, Keyring};
use crate::{Result, error::TapError, models::KeyRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Binary used when none is configured.
const DEFAULT_GPG_BINARY: &str = "gpg";

/// Prefix of every `--status-fd` line.
const STATUS_PREFIX: &str = "[GNUPG:] ";

/// Keyring backed by a GnuPG home directory.
#[derive(Debug, Clone)]
pub struct GnuPgKeyring {
    binary: PathBuf,
    homedir: PathBuf,
}

impl GnuPgKeyring {
    /// Keyring driving `gpg` from `PATH` at `homedir`.
    pub fn new(homedir: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_GPG_BINARY),
            homedir: homedir.into(),
        }
    }

    /// Builder method to use a specific gpg binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// GnuPG home directory.
    pub fn homedir(&self) -> &Path {
        &self.homedir
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--homedir")
            .arg(&self.homedir)
            .args(["--batch", "--no-tty", "--yes"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs a prepared command, feeding `input` on stdin.
    ///
    /// stdin is written from a separate task so a child that fills its
    /// stdout pipe before draining stdin cannot deadlock us.
    async fn run(&self, mut cmd: Command, input: Vec<u8>, operation: &str) -> Result<Output> {
        debug!("Running gpg {} against {}", operation, self.homedir.display());

        let mut child = cmd
            .spawn()
            .map_err(|e| TapError::keyring_failed(format!("Failed to spawn gpg for {}", operation), e))?;

        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                // gpg may exit before reading everything; a broken pipe here
                // surfaces through the exit status instead
                let _ = stdin.write_all(&input).await;
                let _ = stdin.shutdown().await;
            })
        });

        let output = child.wait_with_output().await.map_err(|e| {
            TapError::keyring_failed(format!("Failed to collect gpg output for {}", operation), e)
        })?;

        if let Some(writer) = writer {
            let _ = writer.await;
        }

        Ok(output)
    }
}

/// Prepends the loopback passphrase line to a payload.
fn with_passphrase(passphrase: &str, payload: &str) -> Vec<u8> {
    let capacity = passphrase.len().saturating_add(payload.len()).saturating_add(1);
    let mut input = Vec::with_capacity(capacity);
    input.extend_from_slice(passphrase.as_bytes());
    input.push(b'\n');
    input.extend_from_slice(payload.as_bytes());
    input
}

#[async_trait]
impl Keyring for GnuPgKeyring {
    async fn import_keys(
        &self,
        armored: &str,
        passphrase: Option<&str>,
    ) -> Result<Vec<KeyRecord>> {
        let mut cmd = self.base_command();
        cmd.args(["--status-fd", "1"]);
        let input = match passphrase {
            Some(passphrase) => {
                cmd.args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
                with_passphrase(passphrase, armored)
            }
            None => armored.as_bytes().to_vec(),
        };
        cmd.arg("--import");

        let output = self.run(cmd, input, "import").await?;
        let records = parse_import_status(&String::from_utf8_lossy(&output.stdout));
        if records.is_empty() {
            return Ok(vec![KeyRecord {
                ok: false,
                text: String::from_utf8_lossy(&output.stderr).into_owned(),
                fingerprint: None,
            }]);
        }
        Ok(records)
    }

    async fn list_keys(&self) -> Result<Vec<KeyListing>> {
        let mut cmd = self.base_command();
        cmd.args(["--with-colons", "--fixed-list-mode", "--list-keys"]);

        let output = self.run(cmd, Vec::new(), "list-keys").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TapError::keyring_failed(
                "gpg --list-keys failed",
                std::io::Error::other(stderr.trim().to_string()),
            ));
        }
        Ok(parse_key_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Result<DecryptOutcome> {
        let mut cmd = self.base_command();
        cmd.args([
            "--pinentry-mode",
            "loopback",
            "--passphrase-fd",
            "0",
            "--decrypt",
        ]);

        let output = self
            .run(cmd, with_passphrase(passphrase, ciphertext), "decrypt")
            .await?;
        Ok(DecryptOutcome {
            ok: output.status.success(),
            data: output.stdout,
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn describe(&self) -> String {
        format!("gnupg({})", self.homedir.display())
    }
}

/// Reason text for an `IMPORT_OK` reason bitmask.
///
/// Multiple flags are joined by newlines, with a trailing newline, e.g.
/// `"Not actually changed\n"` for reason 0.
pub fn import_reason_text(reason: u32) -> String {
    const FLAGS: [(u32, &str); 5] = [
        (1, "Entirely new key"),
        (2, "New user IDs"),
        (4, "New signatures"),
        (8, "New subkeys"),
        (16, "Contains private key"),
    ];

    if reason == 0 {
        return format!("{}\n", crate::models::NOT_CHANGED_TEXT);
    }
    let mut text = String::new();
    for (flag, label) in FLAGS {
        if reason & flag != 0 {
            text.push_str(label);
            text.push('\n');
        }
    }
    text
}

fn import_problem_text(reason: u32) -> &'static str {
    match reason {
        1 => "Invalid Certificate",
        2 => "Issuer Certificate missing",
        3 => "Certificate Chain too long",
        4 => "Error storing certificate",
        _ => "No specific reason given",
    }
}

/// Parses `--status-fd` output of `gpg --import` into key records.
pub fn parse_import_status(status: &str) -> Vec<KeyRecord> {
    let mut records = Vec::new();
    for line in status.lines() {
        let Some(rest) = line.strip_prefix(STATUS_PREFIX) else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let keyword = parts.next();
        let reason = parts.next().and_then(|r| r.parse::<u32>().ok()).unwrap_or(0);
        let fingerprint = parts.next().map(str::to_string);

        match keyword {
            Some("IMPORT_OK") => records.push(KeyRecord {
                ok: reason != 0,
                text: import_reason_text(reason),
                fingerprint,
            }),
            Some("IMPORT_PROBLEM") => records.push(KeyRecord {
                ok: false,
                text: format!("{}\n", import_problem_text(reason)),
                fingerprint,
            }),
            _ => {}
        }
    }
    records
}

/// Decodes `\xHH` escapes used in colon listings.
fn unescape_colon_field(field: &str) -> String {
    let mut out = Vec::with_capacity(field.len());
    let mut rest = field.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'\\'
            && let [b'x', high, low, after @ ..] = tail
            && let Some(decoded) = decode_hex_pair(*high, *low)
        {
            out.push(decoded);
            rest = after;
            continue;
        }
        out.push(byte);
        rest = tail;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn decode_hex_pair(high: u8, low: u8) -> Option<u8> {
    let pair = [high, low];
    let hex = std::str::from_utf8(&pair).ok()?;
    u8::from_str_radix(hex, 16).ok()
}

/// Parses `gpg --with-colons --fixed-list-mode --list-keys` output.
///
/// Only primary keys (`pub` records) start a new listing; the first `fpr`
/// record after a `pub` is its fingerprint, `sub` fingerprints are ignored.
pub fn parse_key_listing(listing: &str) -> Vec<KeyListing> {
    let mut keys: Vec<KeyListing> = Vec::new();
    let mut awaiting_primary_fpr = false;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("pub") => {
                let expires = fields
                    .get(6)
                    .filter(|f| !f.is_empty())
                    .and_then(|f| f.parse::<i64>().ok());
                keys.push(KeyListing {
                    fingerprint: String::new(),
                    expires,
                    uids: Vec::new(),
                });
                awaiting_primary_fpr = true;
            }
            Some("sub") => awaiting_primary_fpr = false,
            Some("fpr") if awaiting_primary_fpr => {
                if let (Some(key), Some(fpr)) = (keys.last_mut(), fields.get(9)) {
                    key.fingerprint = (*fpr).to_string();
                }
                awaiting_primary_fpr = false;
            }
            Some("uid") => {
                if let (Some(key), Some(uid)) = (keys.last_mut(), fields.get(9)) {
                    key.uids.push(unescape_colon_field(uid));
                }
            }
            _ => {}
        }
    }
    keys
}
