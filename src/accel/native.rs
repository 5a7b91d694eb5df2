//! Parallel backend built on a dedicated rayon thread pool.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut3, Axis, Zip};
use rayon::prelude::*;

use super::backend::AccelBackend;
use super::kernels;
use crate::geometry::{BBox, CameraIntrinsics};

pub(crate) struct NativeBackend {
    pool: rayon::ThreadPool,
}

impl NativeBackend {
    /// Start the worker pool. Fails if the OS refuses to spawn threads.
    pub(crate) fn try_new() -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("track3d-accel-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl AccelBackend for NativeBackend {
    fn swap_channels(&self, frame: ArrayView3<u8>) -> Array3<u8> {
        let mut out = Array3::<u8>::zeros(frame.dim());
        self.pool.install(|| {
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(frame.axis_iter(Axis(0)).into_par_iter())
                .for_each(|(dst, src)| kernels::swap_row(src, dst));
        });
        out
    }

    fn resize_bilinear(&self, frame: ArrayView3<u8>, new_h: usize, new_w: usize) -> Array3<u8> {
        let (h, w, c) = frame.dim();
        let ratios = kernels::resize_ratios(h, w, new_h, new_w);
        let mut out = Array3::<u8>::zeros((new_h, new_w, c));
        self.pool.install(|| {
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, row)| kernels::resize_row(frame, i, ratios, row));
        });
        out
    }

    fn normalize_frame(&self, frame: ArrayView3<u8>) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros(frame.dim());
        self.pool.install(|| {
            Zip::from(&mut out)
                .and(&frame)
                .par_for_each(|o, &v| *o = v as f32 / 255.0);
        });
        out
    }

    fn nms(&self, boxes: &[BBox], scores: ArrayView1<f32>, iou_threshold: f32) -> Vec<usize> {
        let n = boxes.len();
        let order = kernels::score_order(scores);

        let mut ious = Array2::<f32>::zeros((n, n));
        self.pool.install(|| {
            ious.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, mut row)| {
                    for (j, v) in row.iter_mut().enumerate() {
                        *v = boxes[i].iou(&boxes[j]);
                    }
                });
        });

        kernels::greedy_suppress(&order, iou_threshold, |i, j| ious[[i, j]])
    }

    fn score_mask(&self, scores: ArrayView1<f32>, min_score: f32) -> Vec<usize> {
        let scores: Vec<f32> = scores.to_vec();
        self.pool.install(|| {
            scores
                .par_iter()
                .enumerate()
                .filter_map(|(i, &s)| (s >= min_score).then_some(i))
                .collect()
        })
    }

    fn normalize_depth(&self, depth: ArrayView2<f32>) -> Array2<u8> {
        let (d_min, d_max) = self.pool.install(|| {
            depth
                .axis_iter(Axis(0))
                .into_par_iter()
                .map(kernels::row_range)
                .reduce(
                    || (f32::INFINITY, f32::NEG_INFINITY),
                    kernels::merge_range,
                )
        });

        let range = d_max - d_min;
        let mut out = Array2::<u8>::zeros(depth.dim());
        if range.is_nan() || range < kernels::DEPTH_RANGE_EPSILON {
            return out;
        }
        self.pool.install(|| {
            Zip::from(&mut out)
                .and(&depth)
                .par_for_each(|o, &v| *o = kernels::normalize_depth_value(v, d_min, range));
        });
        out
    }

    fn depth_colormap(&self, depth: ArrayView2<u8>) -> Array3<u8> {
        let (h, w) = depth.dim();
        let mut out = Array3::<u8>::zeros((h, w, 3));
        self.pool.install(|| {
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(depth.axis_iter(Axis(0)).into_par_iter())
                .for_each(|(dst, src)| kernels::colormap_row(src, dst));
        });
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
        self.pool.install(|| {
            out.axis_chunks_iter_mut(Axis(0), w)
                .into_par_iter()
                .zip(depth.axis_iter(Axis(0)).into_par_iter())
                .enumerate()
                .for_each(|(i, (dst, row))| kernels::pointcloud_row(row, i, intrinsics, dst));
        });
        out
    }

    fn draw_boxes(
        &self,
        mut frame: ArrayViewMut3<u8>,
        boxes: &[BBox],
        color: [u8; 3],
        thickness: usize,
    ) {
        // Rasterizing a handful of outlines is cheaper than fanning out.
        for bbox in boxes {
            kernels::draw_box(&mut frame, bbox, color, thickness);
        }
    }

    fn synthetic_frame(&self, h: usize, w: usize, t: f64) -> Array3<u8> {
        let origin = kernels::synthetic_origin(h, w, t);
        let mut frame = Array3::<u8>::zeros((h, w, 3));
        self.pool.install(|| {
            frame
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, row)| kernels::synthetic_row(i, origin, row));
        });
        frame
    }
}
