//! Sequential reference backend. Always available.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut3, Axis};

use super::backend::AccelBackend;
use super::kernels;
use crate::geometry::{BBox, CameraIntrinsics};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PortableBackend;

impl AccelBackend for PortableBackend {
    fn swap_channels(&self, frame: ArrayView3<u8>) -> Array3<u8> {
        let mut out = Array3::<u8>::zeros(frame.dim());
        for (src, dst) in frame.outer_iter().zip(out.outer_iter_mut()) {
            kernels::swap_row(src, dst);
        }
        out
    }

    fn resize_bilinear(&self, frame: ArrayView3<u8>, new_h: usize, new_w: usize) -> Array3<u8> {
        let (h, w, c) = frame.dim();
        let ratios = kernels::resize_ratios(h, w, new_h, new_w);
        let mut out = Array3::<u8>::zeros((new_h, new_w, c));
        for (i, row) in out.axis_iter_mut(Axis(0)).enumerate() {
            kernels::resize_row(frame, i, ratios, row);
        }
        out
    }

    fn normalize_frame(&self, frame: ArrayView3<u8>) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros(frame.dim());
        for (src, dst) in frame.outer_iter().zip(out.outer_iter_mut()) {
            kernels::normalize_frame_row(src, dst);
        }
        out
    }

    fn nms(&self, boxes: &[BBox], scores: ArrayView1<f32>, iou_threshold: f32) -> Vec<usize> {
        let order = kernels::score_order(scores);
        kernels::greedy_suppress(&order, iou_threshold, |i, j| boxes[i].iou(&boxes[j]))
    }

    fn score_mask(&self, scores: ArrayView1<f32>, min_score: f32) -> Vec<usize> {
        scores
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| (s >= min_score).then_some(i))
            .collect()
    }

    fn normalize_depth(&self, depth: ArrayView2<f32>) -> Array2<u8> {
        let (d_min, d_max) = depth
            .outer_iter()
            .map(kernels::row_range)
            .fold((f32::INFINITY, f32::NEG_INFINITY), kernels::merge_range);

        let range = d_max - d_min;
        if range.is_nan() || range < kernels::DEPTH_RANGE_EPSILON {
            return Array2::<u8>::zeros(depth.dim());
        }
        depth.mapv(|v| kernels::normalize_depth_value(v, d_min, range))
    }

    fn depth_colormap(&self, depth: ArrayView2<u8>) -> Array3<u8> {
        let (h, w) = depth.dim();
        let mut out = Array3::<u8>::zeros((h, w, 3));
        for (src, dst) in depth.outer_iter().zip(out.outer_iter_mut()) {
            kernels::colormap_row(src, dst);
        }
        out
    }

    fn depth_to_pointcloud(
        &self,
        depth: ArrayView2<f32>,
        intrinsics: &CameraIntrinsics,
    ) -> Array2<f32> {
        let (h, w) = depth.dim();
        let mut out = Array2::<f32>::zeros((h * w, 3));
        if w == 0 {
            return out;
        }
        for (i, (row, dst)) in depth
            .outer_iter()
            .zip(out.axis_chunks_iter_mut(Axis(0), w))
            .enumerate()
        {
            kernels::pointcloud_row(row, i, intrinsics, dst);
        }
        out
    }

    fn draw_boxes(
        &self,
        mut frame: ArrayViewMut3<u8>,
        boxes: &[BBox],
        color: [u8; 3],
        thickness: usize,
    ) {
        for bbox in boxes {
            kernels::draw_box(&mut frame, bbox, color, thickness);
        }
    }

    fn synthetic_frame(&self, h: usize, w: usize, t: f64) -> Array3<u8> {
        let origin = kernels::synthetic_origin(h, w, t);
        let mut frame = Array3::<u8>::zeros((h, w, 3));
        for (i, row) in frame.outer_iter_mut().enumerate() {
            kernels::synthetic_row(i, origin, row);
        }
        frame
    }
}
