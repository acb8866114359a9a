//! Overlay test support utilities
//!
//! This crate provides utilities for testing the overlay, including unified
//! logging initialization, unique namespace generation and fixture file helpers.

pub mod fixture_files;
pub mod test_logging;
pub mod unique_helpers;

pub use fixture_files::write_fixture_file;
pub use unique_helpers::{unique_namespace, unique_str};
