//! The capability interface implemented by each acceleration backend.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut3};

use crate::geometry::{BBox, CameraIntrinsics};

/// Numeric operations with one implementation per backend.
///
/// Inputs are already validated by [`Accelerator`](super::Accelerator):
/// frames passed to `swap_channels` and `draw_boxes` have three channels,
/// `boxes` and `scores` have equal lengths, and `resize_bilinear` receives
/// a non-empty source whose size differs from the target.
pub(crate) trait AccelBackend: Send + Sync {
    fn swap_channels(&self, frame: ArrayView3<u8>) -> Array3<u8>;

    fn resize_bilinear(&self, frame: ArrayView3<u8>, new_h: usize, new_w: usize) -> Array3<u8>;

    fn normalize_frame(&self, frame: ArrayView3<u8>) -> Array3<f32>;

    fn nms(&self, boxes: &[BBox], scores: ArrayView1<f32>, iou_threshold: f32) -> Vec<usize>;

    /// Indices of scores `>= min_score`, in input order.
    fn score_mask(&self, scores: ArrayView1<f32>, min_score: f32) -> Vec<usize>;

    fn normalize_depth(&self, depth: ArrayView2<f32>) -> Array2<u8>;

    fn depth_colormap(&self, depth: ArrayView2<u8>) -> Array3<u8>;

    fn depth_to_pointcloud(
        &self,
        depth: ArrayView2<f32>,
        intrinsics: &CameraIntrinsics,
    ) -> Array2<f32>;

    /// Outline `boxes` directly on `frame`.
    fn draw_boxes(
        &self,
        frame: ArrayViewMut3<u8>,
        boxes: &[BBox],
        color: [u8; 3],
        thickness: usize,
    );

    fn synthetic_frame(&self, h: usize, w: usize, t: f64) -> Array3<u8>;
}
