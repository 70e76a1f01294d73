//! # Bale Testkit
//!
//! Test utilities for Bale.
//!
//! This crate provides:
//! - Segmentor fixtures over in-memory and temporary on-disk stores
//! - Property-based test generators using proptest
//! - Known-answer vectors for archive framing and piece sizing
//!
//! ## Usage
//!
//! ```rust
//! use bale_testkit::prelude::*;
//!
//! let fixture = TestSegmentor::memory();
//! let segment = fixture.store_bytes(&sample_data(1000, 7));
//! assert_eq!(segment.raw_size, 1000);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
