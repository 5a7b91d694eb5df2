//! Traits for the detection and depth models feeding the tracker.

use std::convert::Infallible;

use ndarray::{Array2, ArrayView3};

use crate::tracker::Detection;

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to the tracker.
///
/// # Example
///
/// ```
/// use ndarray::ArrayView3;
/// use track3d_rs::{Detection, DetectionSource};
///
/// struct MyDetector;
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, _frame: ArrayView3<u8>) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::fmt::Display;

    /// Run inference on an `H×W×3` frame.
    ///
    /// May return an empty vector. The frame is borrowed read-only.
    fn detect(&mut self, frame: ArrayView3<u8>) -> Result<Vec<Detection>, Self::Error>;
}

/// Trait for depth estimators or depth sensors.
pub trait DepthSource {
    type Error: std::fmt::Display;

    /// Produce an `H×W` depth map in meters for `frame`.
    fn estimate(&mut self, frame: ArrayView3<u8>) -> Result<Array2<f32>, Self::Error>;
}

/// Stand-in depth source that reports the same distance for every pixel.
///
/// Used when no depth model is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantDepth(pub f32);

impl ConstantDepth {
    /// Distance assumed when nothing better is known.
    pub const DEFAULT_METERS: f32 = 2.0;
}

impl Default for ConstantDepth {
    fn default() -> Self {
        Self(Self::DEFAULT_METERS)
    }
}

impl DepthSource for ConstantDepth {
    type Error = Infallible;

    fn estimate(&mut self, frame: ArrayView3<u8>) -> Result<Array2<f32>, Self::Error> {
        let (h, w, _) = frame.dim();
        Ok(Array2::from_elem((h, w), self.0))
    }
}

/// Helper trait for converting model-specific outputs to `Detection`.
///
/// Implement this for your model's output format to enable easy conversion.
pub trait IntoDetections {
    /// Convert the output into a vector of detections.
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}
