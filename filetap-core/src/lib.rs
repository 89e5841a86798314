//! Core pipeline for filetap, an incremental file-ingestion connector.
//!
//! Files dropped under a directory tree are listed per table, optionally
//! decrypted with GnuPG, parsed as delimited text and emitted as schema
//! conforming records. A `modified_since` bookmark per table is advanced
//! and persisted after every file.
//!
//! # Security Guarantees
//! - Passphrases and private keys live in zeroizing containers and are
//!   never logged or printed by `Debug`
//! - Passphrases reach gpg over stdin, never on the command line
//! - Decrypted plaintext only touches anonymous temp files
//!
//! # Architecture
//! - Transport trait + factory for file access (`transport`)
//! - Keyring trait behind the key lifecycle manager (`security`)
//! - Sequential, resumable per-table sync loop (`sync`)

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod rows;
pub mod security;
pub mod selector;
pub mod sink;
pub mod stats;
pub mod sync;
pub mod transform;
pub mod transport;
pub mod validation;

// Re-export commonly used types
pub use config::{GpgParams, TableSpec, TapConfig, TransportConfig};
pub use error::{Result, TapError};
pub use models::{Catalog, FileDescriptor, StreamDescriptor};
pub use security::{GnuPgKeyring, KeyLifecycleManager, Keyring};
pub use selector::{Checkpoint, FileSelector};
pub use sink::{JsonLinesSink, Message, RecordSink, State};
pub use stats::SyncStats;
pub use sync::SyncOrchestrator;
pub use transform::{TransformError, Transformer};
pub use transport::{FileTransport, create_transport};
pub use validation::{ValidationError, initialize_validators};
