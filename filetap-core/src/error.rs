//! Error types for the sync pipeline.
//!
//! Every fatal condition of a table sync maps to one variant of [`TapError`]
//! so callers match on the failure kind instead of parsing messages. Key
//! material and passphrases are never part of any error message.

use thiserror::Error;

/// Main error type for filetap operations.
#[derive(Debug, Error)]
pub enum TapError {
    /// Armored key was malformed or rejected by the keyring
    #[error("Key import failed: {message}")]
    KeyImport { message: String },

    /// Key is expired or its validity could not be verified
    #[error("Key expiration check failed: {message}")]
    KeyExpiration { message: String },

    /// Ciphertext could not be decrypted
    #[error("GPG decryption failed: {message}")]
    GpgDecrypt { message: String },

    /// The keyring backend itself failed (process spawn, pipe, exit code)
    #[error("Keyring operation failed: {context}")]
    Keyring {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Listing or opening remote files failed
    #[error("Transport operation failed: {context}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Delimited file could not be parsed
    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    /// Record did not conform to the stream schema
    #[error("Record transformation failed: {0}")]
    Transform(#[from] crate::transform::TransformError),

    /// Unsupported transport, encoding or compression
    #[error("Unsupported operation: {feature} ({detail})")]
    UnsupportedFeature { feature: String, detail: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with TapError
pub type Result<T> = std::result::Result<T, TapError>;

impl TapError {
    /// Creates a key import error
    pub fn key_import(message: impl Into<String>) -> Self {
        Self::KeyImport {
            message: message.into(),
        }
    }

    /// Creates a key expiration error
    pub fn key_expiration(message: impl Into<String>) -> Self {
        Self::KeyExpiration {
            message: message.into(),
        }
    }

    /// Creates a decryption error
    pub fn gpg_decrypt(message: impl Into<String>) -> Self {
        Self::GpgDecrypt {
            message: message.into(),
        }
    }

    /// Creates a keyring backend error with context
    pub fn keyring_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Keyring {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a transport error with context
    pub fn transport_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a parse error for the given file
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an unsupported feature error
    pub fn unsupported_feature(feature: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
            detail: detail.into(),
        }
    }

    /// Returns true for the three key lifecycle failure kinds.
    pub fn is_gpg_error(&self) -> bool {
        matches!(
            self,
            Self::KeyImport { .. } | Self::KeyExpiration { .. } | Self::GpgDecrypt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = TapError::configuration("start_date is required");
        assert!(error.to_string().contains("start_date is required"));

        let error = TapError::key_expiration("certificate expired at: 2020-01-01 00:00:00");
        assert!(error.to_string().contains("2020-01-01 00:00:00"));
        assert!(error.is_gpg_error());
    }

    #[test]
    fn test_parse_error_names_file() {
        let error = TapError::parse("/in/orders.csv", "file missing required headers: id");
        let msg = error.to_string();
        assert!(msg.contains("/in/orders.csv"));
        assert!(msg.contains("id"));
        assert!(!error.is_gpg_error());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let error = TapError::io(
            "Failed to open file",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
