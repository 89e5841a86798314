//! Configuration types for the connector.
//!
//! # Module Structure
//! - `tap`: top-level config file (`TapConfig`)
//! - `table`: per-table discovery and parsing settings (`TableSpec`)
//! - `gpg`: optional decryption settings and their resolution
//! - `transport`: where files are listed and read from

pub mod gpg;
mod tap;
mod table;
mod transport;

pub use gpg::{DEFAULT_GNUPG_HOME, GpgParams, resolve_config, resolve_for_table};
pub use tap::TapConfig;
pub use table::TableSpec;
pub use transport::{DEFAULT_SFTP_PORT, TransportConfig};
