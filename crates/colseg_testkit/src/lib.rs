//! # colseg Testkit
//!
//! Test utilities for colseg.
//!
//! This crate provides:
//! - Test fixtures: temporary segment directories and sample segments
//! - Property-based test generators using proptest
//! - Fuzz testing harnesses
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use colseg_testkit::prelude::*;
//!
//! with_test_dir(|dir| {
//!     let fd = dir.write_segment(&scenarios::id_name_segment("seg_0", 1000));
//!     assert_eq!(fd.info().unwrap().row_count, 1000);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
#[cfg(test)]
mod properties;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use stress::*;
