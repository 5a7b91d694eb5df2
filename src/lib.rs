//! 3D multi-object tracking from per-frame 2D detections and a depth map.
//!
//! The crate is split into four layers:
//!
//! - [`geometry`]: boxes, IOU, pinhole back-projection and depth-region reduction.
//! - [`accel`]: numeric frame/depth operations with a native (parallel) and a
//!   portable backend that produce identical results.
//! - [`tracker`]: the track lifecycle manager (greedy IOU association, creation,
//!   aging, eviction, velocity).
//! - [`integration`]: detector/depth traits and the [`Tracker3D`] facade.
//!
//! # Example
//!
//! ```
//! use track3d_rs::{Detection, TrackManager, TrackerConfig};
//! use ndarray::Array2;
//!
//! let mut manager = TrackManager::new(TrackerConfig {
//!     min_hits: 1,
//!     ..TrackerConfig::default()
//! });
//! let depth = Array2::from_elem((480, 640), 2.0f32);
//! let detection = Detection::new(100.0, 100.0, 200.0, 220.0, 0.9, 0);
//! let tracks = manager.update(&[detection], depth.view(), 0.0);
//! assert_eq!(tracks.len(), 1);
//! assert_eq!(tracks[0].class_name, "person");
//! ```

pub mod accel;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod tracker;

pub use accel::{Accelerator, BackendKind, BackendPreference, DetectionArrays};
pub use error::{Error, Result};
pub use geometry::{BBox, CameraIntrinsics, DepthMethod};
pub use integration::{
    ConstantDepth, DepthSource, DetectionBuilder, DetectionSource, IntoDetections, Tracker3D,
};
pub use tracker::{
    ClassNames, Detection, Track, TrackManager, TrackState, TrackerConfig, TrackerOptions,
};
