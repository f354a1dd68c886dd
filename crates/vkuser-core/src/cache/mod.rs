//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing API responses per
//! user. Entries are JSON files keyed by a hash of the method name and its
//! parameters, each with its own lifetime.
//!
//! In offline mode expired entries are still served and never deleted.

pub mod manager;

pub use manager::{CacheManager, CachedData};
