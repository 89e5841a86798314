//! File transport traits and factory.
//!
//! A transport lists candidate files under a prefix and opens read handles
//! for them. The sync pipeline only sees [`FileTransport`], so the local
//! filesystem and remote servers are interchangeable.
//!
//! # Module Structure
//! - `local`: transport over a local directory tree

use crate::{Result, config::TransportConfig, models::FileDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::io::Read;

pub mod local;

pub use local::LocalTransport;

/// Readable byte stream of one file.
pub type FileHandle = Box<dyn Read + Send>;

/// Main trait for file transports with object-safe design.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn FileTransport>`.
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Checks that the transport is reachable without listing anything.
    ///
    /// # Errors
    /// Returns `TapError::Transport` if the root cannot be reached
    async fn test_connection(&self) -> Result<()>;

    /// Lists files under `prefix` whose path matches `pattern` (search
    /// semantics) and whose modification time is at or after
    /// `modified_since`. Order is unspecified.
    async fn list_files(
        &self,
        prefix: &str,
        pattern: &Regex,
        modified_since: DateTime<Utc>,
    ) -> Result<Vec<FileDescriptor>>;

    /// Opens a read handle for a previously listed file.
    async fn open_handle(&self, file: &FileDescriptor) -> Result<FileHandle>;

    /// Human readable location (never includes credentials).
    fn describe(&self) -> String;
}

/// Creates the transport for a configuration.
///
/// # Errors
/// Returns `TapError::UnsupportedFeature` for SFTP, which is not compiled
/// into this build.
pub fn create_transport(config: &TransportConfig) -> Result<Box<dyn FileTransport>> {
    match config {
        TransportConfig::Local { root } => Ok(Box::new(LocalTransport::new(root.clone()))),
        TransportConfig::Sftp { .. } => Err(crate::error::TapError::unsupported_feature(
            "sftp transport",
            format!("{} cannot be reached; configure local_root instead", config),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TapError;
    use crate::security::Credentials;
    use std::path::PathBuf;

    #[test]
    fn test_create_local_transport() {
        let transport = create_transport(&TransportConfig::Local {
            root: PathBuf::from("/srv/drop"),
        })
        .unwrap();
        assert_eq!(transport.describe(), "file:///srv/drop");
    }

    #[test]
    fn test_sftp_is_unsupported() {
        let config = TransportConfig::Sftp {
            host: "sftp.example.com".to_string(),
            port: 22,
            credentials: Credentials::new("drop".to_string(), Some("secret".to_string())),
            private_key_file: None,
        };
        let err = create_transport(&config).err().unwrap();
        assert!(matches!(err, TapError::UnsupportedFeature { .. }));
        assert!(!err.to_string().contains("secret"));
    }
}
