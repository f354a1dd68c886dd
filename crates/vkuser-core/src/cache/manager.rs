use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::api::Params;

/// Default entry lifetime in minutes
pub const DEFAULT_LIFETIME_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    pub lifetime_minutes: i64,
}

impl<T> CachedData<T> {
    pub fn new(data: T, lifetime_minutes: i64) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            lifetime_minutes,
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.cached_at + Duration::minutes(self.lifetime_minutes)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }
}

/// Feed one length-prefixed field into the key hash.
fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Cache key for a call. The access token is not part of the key, so a
    /// renewed token still finds the user's earlier responses.
    pub fn key_for(method: &str, params: &Params) -> String {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, method);
        for (key, value) in params.without_token() {
            update_field(&mut hasher, key);
            update_field(&mut hasher, value);
        }
        hex::encode(hasher.finalize())
    }

    fn user_dir(&self, user_id: u64) -> PathBuf {
        self.cache_dir.join(user_id.to_string())
    }

    fn cache_path(&self, user_id: u64, key: &str) -> PathBuf {
        self.user_dir(user_id).join(format!("{}.json", key))
    }

    fn load<T: DeserializeOwned>(&self, user_id: u64, key: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(user_id, key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", key))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", key))?;

        Ok(Some(cached))
    }

    pub(crate) fn save_entry<T: Serialize>(
        &self,
        user_id: u64,
        key: &str,
        cached: &CachedData<T>,
    ) -> Result<()> {
        std::fs::create_dir_all(self.user_dir(user_id))?;
        let contents = serde_json::to_string_pretty(cached)?;
        std::fs::write(self.cache_path(user_id, key), contents)?;
        Ok(())
    }

    /// Read an entry.
    ///
    /// In offline mode an expired entry is returned as-is and left on disk.
    /// Otherwise an expired entry is deleted and treated as absent.
    pub fn read<T: DeserializeOwned>(
        &self,
        user_id: u64,
        key: &str,
        offline_mode: bool,
    ) -> Result<Option<CachedData<T>>> {
        let Some(cached) = self.load::<T>(user_id, key)? else {
            return Ok(None);
        };

        if !cached.is_expired() || offline_mode {
            return Ok(Some(cached));
        }

        debug!(user_id, key, age_minutes = cached.age_minutes(), "Evicting expired cache entry");
        self.remove(user_id, key)?;
        Ok(None)
    }

    pub fn store<T: Serialize>(
        &self,
        user_id: u64,
        key: &str,
        data: &T,
        lifetime_minutes: i64,
    ) -> Result<()> {
        self.save_entry(user_id, key, &CachedData::new(data, lifetime_minutes))
    }

    pub fn contains(&self, user_id: u64, key: &str) -> bool {
        self.cache_path(user_id, key).exists()
    }

    /// Returns whether an entry was removed.
    pub fn remove(&self, user_id: u64, key: &str) -> Result<bool> {
        let path = self.cache_path(user_id, key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove cache file: {}", key))?;
        Ok(true)
    }

    /// Drop every cached response of one user.
    pub fn clear_user(&self, user_id: u64) -> Result<()> {
        let dir = self.user_dir(user_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear cache for user {}", user_id))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn manager() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().join("responses")).unwrap();
        (dir, manager)
    }

    fn seed_expired(manager: &CacheManager, user_id: u64, key: &str, value: Value) {
        let mut cached = CachedData::new(value, DEFAULT_LIFETIME_MINUTES);
        // Expired one hour ago
        cached.cached_at = Utc::now() - Duration::minutes(DEFAULT_LIFETIME_MINUTES + 60);
        manager.save_entry(user_id, key, &cached).unwrap();
    }

    #[test]
    fn test_cached_data_is_expired() {
        let fresh = CachedData::new(vec![1], 60);
        assert!(!fresh.is_expired());

        let mut old = CachedData::new(vec![1], 60);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_expired());
    }

    #[test]
    fn test_cached_data_age_minutes() {
        let cached = CachedData::new(vec![1], 60);
        assert!(cached.age_minutes() <= 1);
    }

    #[test]
    fn test_key_ignores_token_and_order() {
        let a = Params::new().with("owner_id", 1).with("count", 5).with_token("one");
        let b = Params::new().with("count", 5).with("owner_id", 1).with_token("two");
        let c = Params::new().with("count", 6).with("owner_id", 1);
        assert_eq!(CacheManager::key_for("wall.get", &a), CacheManager::key_for("wall.get", &b));
        assert_ne!(CacheManager::key_for("wall.get", &a), CacheManager::key_for("wall.get", &c));
        assert_ne!(CacheManager::key_for("wall.get", &a), CacheManager::key_for("photos.get", &a));
    }

    #[test]
    fn test_key_separators_in_values_do_not_collide() {
        let joined = Params::new().with("a", "1\nb=2");
        let split = Params::new().with("a", "1").with("b", "2");
        assert_ne!(
            CacheManager::key_for("wall.get", &joined),
            CacheManager::key_for("wall.get", &split)
        );

        let shifted = Params::new().with("ab", "c");
        let unshifted = Params::new().with("a", "bc");
        assert_ne!(
            CacheManager::key_for("wall.get", &shifted),
            CacheManager::key_for("wall.get", &unshifted)
        );
    }

    #[test]
    fn test_store_and_read_fresh() {
        let (_dir, manager) = manager();
        manager.store(1, "k", &json!({"count": 3}), 60).unwrap();

        let cached = manager.read::<Value>(1, "k", false).unwrap().unwrap();
        assert_eq!(cached.data, json!({"count": 3}));
        assert!(manager.read::<Value>(2, "k", false).unwrap().is_none());
    }

    #[test]
    fn test_offline_read_returns_expired_without_evicting() {
        let (_dir, manager) = manager();
        let seeded = json!([{"id": 1, "first_name": "Durov"}]);
        seed_expired(&manager, 1, "k", seeded.clone());

        let cached = manager.read::<Value>(1, "k", true).unwrap().unwrap();
        assert_eq!(cached.data, seeded);
        assert!(cached.is_expired());
        assert!(manager.contains(1, "k"));

        // Reading again offline still finds it
        assert!(manager.read::<Value>(1, "k", true).unwrap().is_some());
        assert!(manager.contains(1, "k"));
    }

    #[test]
    fn test_online_read_evicts_expired() {
        let (_dir, manager) = manager();
        seed_expired(&manager, 1, "k", json!(1));

        assert!(manager.read::<Value>(1, "k", false).unwrap().is_none());
        assert!(!manager.contains(1, "k"));
    }

    #[test]
    fn test_remove_and_clear_user() {
        let (_dir, manager) = manager();
        manager.store(1, "a", &json!(1), 60).unwrap();
        manager.store(1, "b", &json!(2), 60).unwrap();
        manager.store(2, "a", &json!(3), 60).unwrap();

        assert!(manager.remove(1, "a").unwrap());
        assert!(!manager.remove(1, "a").unwrap());

        manager.clear_user(1).unwrap();
        assert!(!manager.contains(1, "b"));
        assert!(manager.contains(2, "a"));
        manager.clear_user(42).unwrap();
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let (_dir, manager) = manager();
        std::fs::create_dir_all(manager.user_dir(1)).unwrap();
        std::fs::write(manager.cache_path(1, "bad"), "not json").unwrap();
        assert!(manager.read::<Value>(1, "bad", false).is_err());
    }
}
