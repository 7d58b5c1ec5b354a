//! Common utilities and types shared across OneIndex crates.
//!
//! This crate provides the error taxonomy and the drive addressing types
//! that every other crate builds on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{encode_segment, DriveContext, DrivePath};
