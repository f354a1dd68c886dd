//! Authentication module for tracking locally authenticated users.
//!
//! This module provides:
//! - `CredentialRecord`: immutable pairing of a user id and an access token
//! - `CredentialPersistence`: durable storage backends (memory, JSON file, OS keychain)
//! - `SessionStore`: the registry of records and the "current user" designation
//! - `Session`: a live facade over whichever record is currently active
//!
//! Tokens may be encrypted at rest with a passphrase-derived key, see `TokenVault`.

pub mod credentials;
pub mod keychain;
pub mod persistence;
pub mod session;
pub mod store;
pub mod vault;

pub use credentials::CredentialRecord;
pub use keychain::KeyringCredentialStore;
pub use persistence::{CredentialPersistence, FileCredentialStore, MemoryCredentialStore};
pub use session::Session;
pub use store::{SessionOptions, SessionStore};
pub use vault::{TokenVault, VaultError};
