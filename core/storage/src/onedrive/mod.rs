//! OneDrive / Microsoft Graph backend for OneIndex.
//!
//! This module provides:
//! - OAuth2 token refresh with a fixed 3500 second lifetime
//! - A Graph client that takes the credential explicitly on every call
//! - Drive addressing by site, user, or the signed-in account
//! - File and in-memory credential stores

pub mod auth;
pub mod client;
pub mod config;
pub mod index;
pub mod store;
pub mod transport;

pub use auth::{
    is_expired, AuthManager, Credential, CredentialUpdate, TokenManager, DEFAULT_SCOPE,
    DEFAULT_TENANT, TOKEN_LIFETIME_SECS,
};
pub use client::{repair_latin1, ApiRequest, ApiResponse, GraphClient, ListOptions, DEFAULT_FIELDS};
pub use config::{GraphConfig, Timeouts};
pub use index::DriveIndex;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use transport::{Body, HttpRequest, Transport};
