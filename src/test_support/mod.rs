//! Internal helpers re-exported for integration tests.
//!
//! Provides log capture for asserting on warnings and small filesystem
//! fixtures for building artifact trees.

mod fixtures;
mod logging;

pub use fixtures::{read_tree, write_tree};
pub use logging::{capture_logs, capture_warn_logs};
