//! vkuser core library.
//!
//! Tracks which locally authenticated VK user is acting, stamps outgoing API
//! requests with that user's access token, and caches read responses for
//! offline use.
//!
//! - [`auth`]: credential records, their persistence backends, the
//!   [`SessionStore`] and the [`Session`] facade
//! - [`api`]: endpoint catalog, request construction and the HTTP transport
//! - [`cache`]: per-user response cache with an offline read policy
//! - [`config`]: on-disk configuration and directory layout

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;

pub use api::{ApiClient, ApiError, ApiMethod, Endpoint, Params, Request};
pub use auth::{CredentialPersistence, CredentialRecord, Session, SessionOptions, SessionStore};
pub use cache::CacheManager;
pub use config::Config;
