//! Partial and combined CSV artifacts.
//!
//! This crate provides:
//! - [`ArtifactLayout`]: where partial and combined files live
//! - [`PartialOutputWriter`] / [`PartialErrorWriter`]: per-worker writers
//! - [`aggregate`]: fold the partials into the combined artifacts

pub mod aggregate;
pub mod layout;
pub mod partial;

pub use aggregate::{AggregateSummary, aggregate};
pub use layout::ArtifactLayout;
pub use partial::{PartialErrorWriter, PartialOutputWriter};
