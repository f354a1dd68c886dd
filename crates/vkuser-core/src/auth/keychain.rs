use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::credentials::CredentialRecord;
use super::persistence::CredentialPersistence;

/// Keychain service name tokens are filed under
pub const SERVICE_NAME: &str = "vkuser";

/// Index file name. Keychains cannot be enumerated, so the list of stored
/// users and their token metadata lives next to the cache.
pub const INDEX_FILE: &str = "keychain_index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeychainIndex {
    #[serde(default)]
    users: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    user_id: u64,
    issued_at: DateTime<Utc>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Keeps tokens in the OS keychain.
pub struct KeyringCredentialStore {
    service: String,
    index_path: PathBuf,
    lock: Mutex<()>,
}

impl KeyringCredentialStore {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self::with_service(SERVICE_NAME, index_path)
    }

    pub fn with_service(service: impl Into<String>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            index_path: index_path.into(),
            lock: Mutex::new(()),
        }
    }

    fn entry(&self, user_id: u64) -> Result<Entry> {
        Entry::new(&self.service, &user_id.to_string()).context("Failed to create keyring entry")
    }

    fn read_index(&self) -> Result<KeychainIndex> {
        if !self.index_path.exists() {
            return Ok(KeychainIndex::default());
        }
        let contents =
            std::fs::read_to_string(&self.index_path).context("Failed to read keychain index")?;
        serde_json::from_str(&contents).context("Failed to parse keychain index")
    }

    fn write_index(&self, index: &KeychainIndex) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(index)?;
        std::fs::write(&self.index_path, contents).context("Failed to write keychain index")?;
        Ok(())
    }
}

impl CredentialPersistence for KeyringCredentialStore {
    fn load_all(&self) -> Result<Vec<CredentialRecord>> {
        let _guard = self.lock.lock();
        let index = self.read_index()?;

        let mut records = Vec::with_capacity(index.users.len());
        for entry in index.users {
            match self.entry(entry.user_id)?.get_password() {
                Ok(token) => records.push(CredentialRecord::from_parts(
                    entry.user_id,
                    token,
                    entry.issued_at,
                    entry.expires_in,
                )),
                Err(e) => {
                    warn!(
                        user_id = entry.user_id,
                        error = %e,
                        "Token missing from keychain, skipping"
                    );
                }
            }
        }
        Ok(records)
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let _guard = self.lock.lock();
        self.entry(record.user_id())?
            .set_password(record.token())
            .context("Failed to store token in keychain")?;

        let mut index = self.read_index()?;
        index.users.retain(|u| u.user_id != record.user_id());
        index.users.push(IndexEntry {
            user_id: record.user_id(),
            issued_at: record.issued_at(),
            expires_in: record.expires_in(),
        });
        self.write_index(&index)
    }

    fn delete(&self, user_id: u64) -> Result<()> {
        let _guard = self.lock.lock();
        match self.entry(user_id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(e).context("Failed to delete token from keychain"),
        }

        let mut index = self.read_index()?;
        index.users.retain(|u| u.user_id != user_id);
        self.write_index(&index)
    }
}
