//! Request construction and execution against the VK REST API.
//!
//! This module provides:
//! - `methods`: the catalog of remote methods, grouped by category
//! - `Request`: a request stamped with the current user's token, started
//!   immediately or left dormant per session options
//! - `ApiClient`: executes requests through a `Transport`, applying the
//!   offline cache policy to read methods
//! - `HttpTransport`: GET `https://api.vk.com/method/<name>` over reqwest

pub mod client;
pub mod error;
pub mod methods;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use methods::{
    ApiMethod, Endpoint, FriendsMethod, GroupsMethod, MethodCategory, PhotosMethod,
    ProfileMethod, WallMethod,
};
pub use request::{Params, PreparedCall, Request};
pub use transport::{HttpTransport, Transport};
