//! Secrets handling and the GnuPG key lifecycle.
//!
//! # Module Structure
//! - `credentials`: zeroizing containers for passwords and key material
//! - `keyring`: the `Keyring` capability trait
//! - `gnupg`: `Keyring` implementation driving the `gpg` CLI
//! - `key_lifecycle`: import / expiration / decrypt on top of a `Keyring`

mod credentials;
pub mod gnupg;
pub mod key_lifecycle;
pub mod keyring;

pub use credentials::{Credentials, Secret};
pub use gnupg::GnuPgKeyring;
pub use key_lifecycle::{AttributeValue, KeyAttribute, KeyLifecycleManager};
pub use keyring::{DecryptOutcome, KeyListing, Keyring};
