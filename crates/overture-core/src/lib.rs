//! Core types and utilities for the Overture PHP version manager.
//!
//! This crate provides foundational types used throughout Overture:
//! - PHP version parsing and spec resolution
//! - Resource classes and artifact descriptors
//! - Atomic state-file writes and JSON helpers
//! - Error types

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
mod fs;
mod json;
mod resource;
mod version;

pub use error::{Error, ErrorCode, FailedAttempt, Result};
pub use fs::{sync_parent_dir, write_atomic};
pub use json::{
    from_json, from_json_slice, read_json_file, to_json, to_json_pretty, write_json_file,
};
pub use resource::{Artifact, ResourceClass};
pub use version::{PhpVersion, VersionSpec};

// Re-export commonly used types
pub use semver::Version;
