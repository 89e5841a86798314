//! The incremental sync pipeline.
//!
//! # Module Structure
//! - `orchestrator`: per-table loop, checkpoint handling
//! - `decrypt`: optional GnuPG decryption of a file
//! - `emitter`: parse a file and write its records

pub mod decrypt;
pub mod emitter;
mod orchestrator;

pub use emitter::{SDC_SOURCE_FILE, SDC_SOURCE_LINENO};
pub use orchestrator::{LAST_FILE, MODIFIED_SINCE, SyncOrchestrator};
