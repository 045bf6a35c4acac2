//! Cache lookup, insertion, and enumeration operations.
//!
//! Provides the [`ArtifactCache`](super::ArtifactCache) methods for checking
//! entry status, populating entries from a produced artifact, and scanning
//! every entry for auditing tools.

mod copy;
mod entry;
mod lookup;
mod populate;
mod visit;

pub(crate) use copy::copy_file_out;
pub use visit::VisitSummary;
