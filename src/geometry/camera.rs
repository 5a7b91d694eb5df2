//! Pinhole camera intrinsics and pixel back-projection.

use nalgebra::{Matrix3, Vector3};

/// Pinhole camera intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl CameraIntrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Approximate intrinsics for an uncalibrated webcam.
    ///
    /// Focal length is taken as `0.8 * width` on both axes and the principal
    /// point sits at the image center. This is a rough guess, not a calibration.
    pub fn from_image_size(width: usize, height: usize) -> Self {
        let f = 0.8 * width as f32;
        Self {
            fx: f,
            fy: f,
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
        }
    }

    /// Read intrinsics from a 3x3 camera matrix `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn from_matrix(k: &Matrix3<f32>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    /// The 3x3 camera matrix for these intrinsics.
    pub fn to_matrix(&self) -> Matrix3<f32> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Back-project pixel `(u, v)` at `depth` meters into the camera frame.
    #[inline]
    pub fn back_project(&self, u: f32, v: f32, depth: f32) -> Vector3<f32> {
        Vector3::new(
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        )
    }
}

/// Inverse pinhole projection: x right, y down, z away from the camera.
#[inline]
pub fn back_project(u: f32, v: f32, depth: f32, intrinsics: &CameraIntrinsics) -> Vector3<f32> {
    intrinsics.back_project(u, v, depth)
}
