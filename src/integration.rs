//! Integration module for connecting detection and depth models with the tracker.
//!
//! This module provides the source traits, a detection builder and the
//! [`Tracker3D`] facade that runs detection, depth and tracking per frame.

mod builder;
mod detector;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{ConstantDepth, DepthSource, DetectionSource, IntoDetections};
pub use pipeline::Tracker3D;
