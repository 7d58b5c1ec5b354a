//! Remote drive access for OneIndex.
//!
//! The only backend is Microsoft Graph (OneDrive and SharePoint document
//! libraries). Callers normally go through [`onedrive::DriveIndex`], which
//! keeps the credential fresh before every drive call.

pub mod onedrive;

pub use onedrive::{
    ApiResponse, Credential, CredentialStore, DriveIndex, FileCredentialStore, GraphClient,
    GraphConfig, ListOptions, MemoryCredentialStore,
};
