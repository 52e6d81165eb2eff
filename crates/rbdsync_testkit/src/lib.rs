//! # rbdsync Testkit
//!
//! Test utilities for rbdsync.
//!
//! This crate provides:
//! - Seeded in-memory production and backup clusters
//! - Hosts with a fake mount table
//! - Temporary lock directories
//! - Property-based generators for snapshot histories
//!
//! ## Usage
//!
//! ```rust
//! use rbdsync_testkit::prelude::*;
//!
//! let clusters = TestClusters::new()
//!     .production("vm", &["2024-01-01", "2024-01-02"])
//!     .backup("vm", &["2024-01-01"]);
//! assert!(clusters.backup.has_image("vm"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
