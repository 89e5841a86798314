//! Transport connection configuration.

use crate::security::Credentials;
use std::path::PathBuf;

/// Default SFTP port.
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Where files are listed and read from.
///
/// # Security
/// `Display` never includes usernames or passwords.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// A local (or mounted) directory tree
    Local { root: PathBuf },
    /// A remote SFTP server
    Sftp {
        host: String,
        port: u16,
        credentials: Credentials,
        private_key_file: Option<PathBuf>,
    },
}

impl std::fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::Local { root } => write!(f, "file://{}", root.display()),
            // Intentionally omit username and never include credentials
            TransportConfig::Sftp { host, port, .. } => write!(f, "sftp://{}:{}", host, port),
        }
    }
}
