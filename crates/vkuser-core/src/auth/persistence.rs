//! Durable storage for credential records.
//!
//! The `SessionStore` loads every record once at startup and writes through
//! on each mutation. Backends:
//!
//!  - `MemoryCredentialStore`: nothing survives the process, used in tests
//!  - `FileCredentialStore`: one JSON document, tokens optionally sealed by a `TokenVault`
//!  - `KeyringCredentialStore` (see `keychain`): tokens in the OS keychain

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credentials::CredentialRecord;
use super::vault::TokenVault;

pub trait CredentialPersistence: Send + Sync {
    fn load_all(&self) -> Result<Vec<CredentialRecord>>;
    /// Insert or replace the record for `record.user_id()`.
    fn save(&self, record: &CredentialRecord) -> Result<()>;
    fn delete(&self, user_id: u64) -> Result<()>;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<u64, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a set of records, as if they had been saved by an earlier process.
    pub fn with_records(records: impl IntoIterator<Item = CredentialRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.user_id(), r)).collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.records.lock().contains_key(&user_id)
    }
}

impl CredentialPersistence for MemoryCredentialStore {
    fn load_all(&self) -> Result<Vec<CredentialRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        self.records.lock().insert(record.user_id(), record.clone());
        Ok(())
    }

    fn delete(&self, user_id: u64) -> Result<()> {
        self.records.lock().remove(&user_id);
        Ok(())
    }
}

// ============================================================================
// JSON file backend
// ============================================================================

/// Credentials file name in the data directory
pub const CREDENTIALS_FILE: &str = "credentials.json";

const FILE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CredentialsFile {
    version: u32,
    /// Hex salt of the vault key. Present only when tokens are sealed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default)]
    records: Vec<StoredRecord>,
}

impl Default for CredentialsFile {
    fn default() -> Self {
        Self {
            version: FILE_FORMAT_VERSION,
            salt: None,
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    user_id: u64,
    token: String,
    issued_at: DateTime<Utc>,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct FileCredentialStore {
    path: PathBuf,
    vault: Option<TokenVault>,
    // Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Plain-text store. Tokens are written as-is.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            vault: None,
            lock: Mutex::new(()),
        }
    }

    /// Store whose tokens are sealed with a key derived from `passphrase`.
    ///
    /// Reuses the salt of an existing file. A plain-text file with records is
    /// re-written sealed.
    pub fn encrypted(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self> {
        let path = path.into();
        let existing = read_file(&path)?;

        let vault = match existing.salt.as_deref() {
            Some(salt) => {
                let salt = hex::decode(salt).context("Invalid salt in credentials file")?;
                TokenVault::derive(passphrase, &salt)?
            }
            None => TokenVault::generate(passphrase)?,
        };

        let store = Self {
            path,
            vault: Some(vault),
            lock: Mutex::new(()),
        };

        if existing.salt.is_none() && !existing.records.is_empty() {
            info!(
                count = existing.records.len(),
                "Sealing plain-text credentials with passphrase"
            );
            let records = existing
                .records
                .into_iter()
                .map(|r| {
                    CredentialRecord::from_parts(r.user_id, r.token, r.issued_at, r.expires_in)
                })
                .collect::<Vec<_>>();
            store.write_records(&records)?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.vault.is_some()
    }

    fn decode(&self, file: CredentialsFile) -> Result<Vec<CredentialRecord>> {
        match (&self.vault, file.salt.is_some()) {
            (None, true) => Err(anyhow::anyhow!(
                "Credentials file {} is encrypted - a passphrase is required",
                self.path.display()
            )),
            (vault, _) => file
                .records
                .into_iter()
                .map(|stored| -> Result<CredentialRecord> {
                    let token = match vault {
                        Some(vault) => vault.open(&stored.token).with_context(|| {
                            format!("Failed to unseal token for user {}", stored.user_id)
                        })?,
                        None => stored.token,
                    };
                    Ok(CredentialRecord::from_parts(
                        stored.user_id,
                        token,
                        stored.issued_at,
                        stored.expires_in,
                    ))
                })
                .collect(),
        }
    }

    fn encode(&self, records: &[CredentialRecord]) -> Result<CredentialsFile> {
        let records = records
            .iter()
            .map(|record| -> Result<StoredRecord> {
                let token = match &self.vault {
                    Some(vault) => vault.seal(record.token())?,
                    None => record.token().to_string(),
                };
                Ok(StoredRecord {
                    user_id: record.user_id(),
                    token,
                    issued_at: record.issued_at(),
                    expires_in: record.expires_in(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CredentialsFile {
            version: FILE_FORMAT_VERSION,
            salt: self.vault.as_ref().map(|v| hex::encode(v.salt())),
            records,
        })
    }

    fn read_records(&self) -> Result<Vec<CredentialRecord>> {
        self.decode(read_file(&self.path)?)
    }

    fn write_records(&self, records: &[CredentialRecord]) -> Result<()> {
        let file = self.encode(records)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<CredentialsFile> {
    if !path.exists() {
        return Ok(CredentialsFile::default());
    }
    let contents = std::fs::read_to_string(path).context("Failed to read credentials file")?;
    let file: CredentialsFile =
        serde_json::from_str(&contents).context("Failed to parse credentials file")?;
    if file.version != FILE_FORMAT_VERSION {
        anyhow::bail!("Unsupported credentials file version {}", file.version);
    }
    Ok(file)
}

impl CredentialPersistence for FileCredentialStore {
    fn load_all(&self) -> Result<Vec<CredentialRecord>> {
        let _guard = self.lock.lock();
        let records = self.read_records()?;
        debug!(count = records.len(), path = %self.path.display(), "Loaded credentials");
        Ok(records)
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let _guard = self.lock.lock();
        let mut records = self.read_records()?;
        records.retain(|r| r.user_id() != record.user_id());
        records.push(record.clone());
        self.write_records(&records)
    }

    fn delete(&self, user_id: u64) -> Result<()> {
        let _guard = self.lock.lock();
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|r| r.user_id() != user_id);
        if records.len() != before {
            self.write_records(&records)?;
        }
        Ok(())
    }
}
