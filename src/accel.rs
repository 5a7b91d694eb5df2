//! Numeric frame and depth operations with a selectable backend.
//!
//! Every operation exists twice: a portable sequential implementation and a
//! native implementation that spreads rows over a rayon thread pool. Both run
//! the same per-row kernels, so their outputs are identical for identical
//! input and the tracker behaves the same whichever one is active.
//!
//! The backend is picked once per [`Accelerator`]. [`Accelerator::shared`]
//! holds the process-wide instance; its choice never changes after the first
//! call.

mod arrays;
mod backend;
mod kernels;
#[cfg(feature = "native")]
mod native;
mod portable;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut3, Axis};
use tracing::{debug, info, warn};

pub use arrays::DetectionArrays;

use crate::error::{Error, Result};
use crate::geometry::{BBox, CameraIntrinsics};
use backend::AccelBackend;
use portable::PortableBackend;

/// Environment variable read by [`Accelerator::shared`]: `auto`, `native` or `portable`.
pub const BACKEND_ENV: &str = "TRACK3D_BACKEND";

/// The implementation behind an [`Accelerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Rayon-parallel implementation
    Native,
    /// Sequential reference implementation
    Portable,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Portable => "portable",
        })
    }
}

/// Which backend to ask for when building an [`Accelerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// Native when it can be started, portable otherwise
    #[default]
    Auto,
    Native,
    Portable,
}

impl FromStr for BackendPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "native" => Ok(Self::Native),
            "portable" => Ok(Self::Portable),
            _ => Err(Error::UnknownBackend(s.to_string())),
        }
    }
}

/// Entry point for the numeric operations.
///
/// Validates array shapes, then dispatches to the backend chosen at
/// construction.
pub struct Accelerator {
    kind: BackendKind,
    backend: Box<dyn AccelBackend>,
}

impl fmt::Debug for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accelerator").field("kind", &self.kind).finish()
    }
}

impl Default for Accelerator {
    fn default() -> Self {
        Self::from_preference(BackendPreference::Auto)
    }
}

impl Accelerator {
    /// Build an accelerator, falling back to portable when native cannot start.
    pub fn from_preference(preference: BackendPreference) -> Self {
        match preference {
            BackendPreference::Portable => Self::portable(),
            BackendPreference::Auto | BackendPreference::Native => {
                Self::try_native().unwrap_or_else(Self::portable)
            }
        }
    }

    /// Build an accelerator for `kind`. Asking for native when it is
    /// unavailable yields a portable accelerator; check [`kind`](Self::kind).
    pub fn with_backend(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Native => Self::from_preference(BackendPreference::Native),
            BackendKind::Portable => Self::portable(),
        }
    }

    /// The process-wide accelerator.
    ///
    /// Built on first call from [`BACKEND_ENV`] (default `auto`) and fixed for
    /// the rest of the process.
    pub fn shared() -> Arc<Accelerator> {
        static SHARED: OnceLock<Arc<Accelerator>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                let preference = match std::env::var(BACKEND_ENV) {
                    Ok(value) => value.parse().unwrap_or_else(|err| {
                        warn!(%err, "ignoring {BACKEND_ENV}, using auto");
                        BackendPreference::Auto
                    }),
                    Err(_) => BackendPreference::Auto,
                };
                let accel = Accelerator::from_preference(preference);
                info!(backend = %accel.kind, ?preference, "acceleration backend selected");
                Arc::new(accel)
            })
            .clone()
    }

    fn portable() -> Self {
        Self {
            kind: BackendKind::Portable,
            backend: Box::new(PortableBackend),
        }
    }

    #[cfg(feature = "native")]
    fn try_native() -> Option<Self> {
        match native::NativeBackend::try_new() {
            Ok(backend) => {
                debug!(threads = backend.num_threads(), "native backend started");
                Some(Self {
                    kind: BackendKind::Native,
                    backend: Box::new(backend),
                })
            }
            Err(err) => {
                debug!(%err, "native backend unavailable, falling back to portable");
                None
            }
        }
    }

    #[cfg(not(feature = "native"))]
    fn try_native() -> Option<Self> {
        debug!("native backend not compiled in, falling back to portable");
        None
    }

    /// The backend this accelerator dispatches to.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn is_native(&self) -> bool {
        self.kind == BackendKind::Native
    }

    /// Convert an `H×W×3` BGR frame to RGB. Always returns a fresh copy.
    pub fn bgr_to_rgb(&self, frame: ArrayView3<u8>) -> Result<Array3<u8>> {
        check_three_channels(&frame)?;
        Ok(self.backend.swap_channels(frame))
    }

    /// Convert an `H×W×3` RGB frame to BGR. Always returns a fresh copy.
    pub fn rgb_to_bgr(&self, frame: ArrayView3<u8>) -> Result<Array3<u8>> {
        check_three_channels(&frame)?;
        Ok(self.backend.swap_channels(frame))
    }

    /// Bilinear resize of an `H×W×C` frame to `new_h×new_w×C`.
    pub fn resize_bilinear(&self, frame: ArrayView3<u8>, new_h: usize, new_w: usize) -> Array3<u8> {
        let (h, w, c) = frame.dim();
        if h == new_h && w == new_w {
            return frame.to_owned();
        }
        if h == 0 || w == 0 || new_h == 0 || new_w == 0 {
            return Array3::zeros((new_h, new_w, c));
        }
        self.backend.resize_bilinear(frame, new_h, new_w)
    }

    /// Map `[0, 255]` samples to `[0, 1]`.
    pub fn normalize_frame(&self, frame: ArrayView3<u8>) -> Array3<f32> {
        self.backend.normalize_frame(frame)
    }

    /// Non-maximum suppression over `N×4` TLBR boxes.
    ///
    /// Returns kept indices, highest score first. Equal scores keep the lower
    /// input index first; NaN scores rank last. A box is suppressed when its
    /// IOU with a kept box is strictly greater than `iou_threshold`.
    pub fn nms(
        &self,
        boxes: ArrayView2<f32>,
        scores: ArrayView1<f32>,
        iou_threshold: f32,
    ) -> Result<Vec<usize>> {
        let boxes = boxes_from_rows(boxes)?;
        if boxes.len() != scores.len() {
            return Err(Error::InvalidShape {
                expected: "one score per box",
                got: vec![boxes.len(), scores.len()],
            });
        }
        Ok(self.backend.nms(&boxes, scores, iou_threshold))
    }

    /// Keep entries with `score >= min_score`, preserving input order.
    pub fn filter_by_score(
        &self,
        boxes: ArrayView2<f32>,
        scores: ArrayView1<f32>,
        class_ids: ArrayView1<u32>,
        min_score: f32,
    ) -> Result<DetectionArrays> {
        let n = scores.len();
        if boxes.dim() != (n, 4) || class_ids.len() != n {
            return Err(Error::InvalidShape {
                expected: "N×4 boxes with N scores and N class ids",
                got: vec![boxes.nrows(), boxes.ncols(), n, class_ids.len()],
            });
        }
        let keep = self.backend.score_mask(scores, min_score);
        Ok(DetectionArrays {
            boxes: boxes.select(Axis(0), &keep),
            scores: scores.select(Axis(0), &keep),
            class_ids: class_ids.select(Axis(0), &keep),
        })
    }

    /// Apply [`filter_by_score`](Self::filter_by_score) to a detection batch.
    pub fn filter_detections(
        &self,
        detections: &DetectionArrays,
        min_score: f32,
    ) -> Result<DetectionArrays> {
        self.filter_by_score(
            detections.boxes.view(),
            detections.scores.view(),
            detections.class_ids.view(),
            min_score,
        )
    }

    /// Rescale a depth map to `[0, 255]` using its own min and max.
    ///
    /// A flat map (range below `1e-9`) yields all zeros.
    pub fn normalize_depth(&self, depth: ArrayView2<f32>) -> Array2<u8> {
        self.backend.normalize_depth(depth)
    }

    /// Map a normalized depth image through the JET palette (BGR output).
    pub fn depth_colormap(&self, depth: ArrayView2<u8>) -> Array3<u8> {
        self.backend.depth_colormap(depth)
    }

    /// Back-project every pixel; one `(x, y, z)` row per pixel in row-major order.
    pub fn depth_to_pointcloud(
        &self,
        depth: ArrayView2<f32>,
        intrinsics: &CameraIntrinsics,
    ) -> Array2<f32> {
        self.backend.depth_to_pointcloud(depth, intrinsics)
    }

    /// Outline `N×4` TLBR boxes on a copy of `frame`.
    pub fn draw_boxes(
        &self,
        frame: ArrayView3<u8>,
        boxes: ArrayView2<f32>,
        color: [u8; 3],
        thickness: usize,
    ) -> Result<Array3<u8>> {
        let mut out = frame.to_owned();
        self.draw_boxes_in_place(out.view_mut(), boxes, color, thickness)?;
        Ok(out)
    }

    /// Outline `N×4` TLBR boxes directly on `frame`.
    pub fn draw_boxes_in_place(
        &self,
        frame: ArrayViewMut3<u8>,
        boxes: ArrayView2<f32>,
        color: [u8; 3],
        thickness: usize,
    ) -> Result<()> {
        if frame.dim().2 != 3 {
            return Err(Error::InvalidShape {
                expected: "H×W×3 frame",
                got: frame.shape().to_vec(),
            });
        }
        let boxes = boxes_from_rows(boxes)?;
        self.backend.draw_boxes(frame, &boxes, color, thickness);
        Ok(())
    }

    /// Black `h×w×3` frame with an 80×80 green square whose position follows `t`.
    pub fn synthetic_frame(&self, h: usize, w: usize, t: f64) -> Array3<u8> {
        self.backend.synthetic_frame(h, w, t)
    }
}

/// Whether the process-wide accelerator runs the native backend.
pub fn native_available() -> bool {
    Accelerator::shared().is_native()
}

fn check_three_channels(frame: &ArrayView3<u8>) -> Result<()> {
    if frame.dim().2 != 3 {
        return Err(Error::InvalidShape {
            expected: "H×W×3 frame",
            got: frame.shape().to_vec(),
        });
    }
    Ok(())
}

fn boxes_from_rows(boxes: ArrayView2<f32>) -> Result<Vec<BBox>> {
    if boxes.ncols() != 4 {
        return Err(Error::InvalidShape {
            expected: "N×4 boxes",
            got: boxes.shape().to_vec(),
        });
    }
    Ok(boxes
        .outer_iter()
        .map(|r| BBox::new(r[0], r[1], r[2], r[3]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    fn accelerators() -> Vec<Accelerator> {
        vec![
            Accelerator::with_backend(BackendKind::Portable),
            Accelerator::with_backend(BackendKind::Native),
        ]
    }

    #[test]
    fn test_parse_preference() {
        assert_eq!("auto".parse::<BackendPreference>(), Ok(BackendPreference::Auto));
        assert_eq!("Native".parse::<BackendPreference>(), Ok(BackendPreference::Native));
        assert_eq!(" portable ".parse::<BackendPreference>(), Ok(BackendPreference::Portable));
        assert!(matches!(
            "gpu".parse::<BackendPreference>(),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_portable_is_always_portable() {
        assert_eq!(Accelerator::with_backend(BackendKind::Portable).kind(), BackendKind::Portable);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_native_starts_when_compiled_in() {
        assert_eq!(Accelerator::with_backend(BackendKind::Native).kind(), BackendKind::Native);
    }

    #[test]
    fn test_shared_is_fixed() {
        let a = Accelerator::shared();
        let b = Accelerator::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(native_available(), a.is_native());
    }

    #[test]
    fn test_nms_single_box() {
        for accel in accelerators() {
            let boxes = array![[10.0f32, 10.0, 50.0, 50.0]];
            let scores = array![0.3f32];
            for thresh in [0.0, 0.5, 1.0] {
                assert_eq!(accel.nms(boxes.view(), scores.view(), thresh).unwrap(), vec![0]);
            }
        }
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        // IOU of these two boxes is 0.9
        let boxes = array![[0.0f32, 0.0, 100.0, 10.0], [0.0, 0.0, 90.0, 10.0]];
        let iou = BBox::new(0.0, 0.0, 100.0, 10.0).iou(&BBox::new(0.0, 0.0, 90.0, 10.0));
        assert!((iou - 0.9).abs() < 1e-6);

        for accel in accelerators() {
            let scores = array![0.6f32, 0.8];
            assert_eq!(accel.nms(boxes.view(), scores.view(), 0.5).unwrap(), vec![1]);
        }
    }

    #[test]
    fn test_nms_keeps_disjoint_boxes_in_score_order() {
        let boxes = array![
            [0.0f32, 0.0, 10.0, 10.0],
            [100.0, 100.0, 110.0, 110.0],
            [1.0, 1.0, 11.0, 11.0],
            [200.0, 0.0, 210.0, 10.0],
        ];
        let scores = array![0.5f32, 0.7, 0.9, 0.7];
        for accel in accelerators() {
            assert_eq!(accel.nms(boxes.view(), scores.view(), 0.5).unwrap(), vec![2, 1, 3]);
        }
    }

    #[test]
    fn test_nms_empty_and_bad_shapes() {
        let accel = Accelerator::with_backend(BackendKind::Portable);
        let empty = Array2::<f32>::zeros((0, 4));
        let no_scores = Array1::<f32>::zeros(0);
        assert!(accel.nms(empty.view(), no_scores.view(), 0.5).unwrap().is_empty());

        let wrong_cols = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            accel.nms(wrong_cols.view(), array![0.1f32, 0.2].view(), 0.5),
            Err(Error::InvalidShape { .. })
        ));
        let two_boxes = Array2::<f32>::zeros((2, 4));
        assert!(accel.nms(two_boxes.view(), array![0.1f32].view(), 0.5).is_err());
    }

    #[test]
    fn test_filter_by_score_keeps_order() {
        let boxes = array![[0.0f32, 0.0, 1.0, 1.0], [1.0, 1.0, 2.0, 2.0], [2.0, 2.0, 3.0, 3.0]];
        let scores = array![0.3f32, 0.1, 0.25];
        let class_ids = array![4u32, 5, 6];
        for accel in accelerators() {
            let kept = accel
                .filter_by_score(boxes.view(), scores.view(), class_ids.view(), 0.25)
                .unwrap();
            assert_eq!(kept.scores.to_vec(), vec![0.3, 0.25]);
            assert_eq!(kept.class_ids.to_vec(), vec![4, 6]);
            assert_eq!(kept.boxes.row(1).to_vec(), vec![2.0, 2.0, 3.0, 3.0]);
        }
    }

    #[test]
    fn test_channel_swap_round_trip() {
        let frame = Array3::from_shape_fn((5, 7, 3), |(i, j, k)| (i * 31 + j * 7 + k * 101) as u8);
        for accel in accelerators() {
            let rgb = accel.bgr_to_rgb(frame.view()).unwrap();
            assert_eq!(rgb[[2, 3, 0]], frame[[2, 3, 2]]);
            assert_eq!(rgb[[2, 3, 2]], frame[[2, 3, 0]]);
            assert_eq!(accel.rgb_to_bgr(rgb.view()).unwrap(), frame);
        }
    }

    #[test]
    fn test_channel_swap_requires_three_channels() {
        let accel = Accelerator::with_backend(BackendKind::Portable);
        let gray = Array3::<u8>::zeros((4, 4, 1));
        assert!(matches!(accel.bgr_to_rgb(gray.view()), Err(Error::InvalidShape { .. })));
    }

    #[test]
    fn test_flat_depth_normalizes_to_zero() {
        let depth = Array2::from_elem((6, 9), 2.5f32);
        for accel in accelerators() {
            let out = accel.normalize_depth(depth.view());
            assert_eq!(out.dim(), (6, 9));
            assert!(out.iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_depth_normalization_spans_range() {
        let depth = array![[1.0f32, 2.0], [3.0, 5.0]];
        for accel in accelerators() {
            assert_eq!(accel.normalize_depth(depth.view()), array![[0u8, 63], [127, 255]]);
        }
    }

    #[test]
    fn test_pointcloud_row_major() {
        let depth = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let k = CameraIntrinsics::new(1.0, 2.0, 1.0, 0.0);
        for accel in accelerators() {
            let cloud = accel.depth_to_pointcloud(depth.view(), &k);
            assert_eq!(cloud.dim(), (6, 3));
            // Pixel (row 1, col 2), depth 6
            assert_eq!(cloud.row(5).to_vec(), vec![6.0, 3.0, 6.0]);
            // Principal point projects onto the optical axis.
            assert_eq!(cloud.row(1).to_vec(), vec![0.0, 0.0, 2.0]);
        }
    }

    #[test]
    fn test_resize_identity_and_upscale() {
        let frame = array![[[0u8], [100]], [[200], [50]]];
        for accel in accelerators() {
            assert_eq!(accel.resize_bilinear(frame.view(), 2, 2), frame);

            let up = accel.resize_bilinear(frame.view(), 4, 4);
            assert_eq!(up.dim(), (4, 4, 1));
            assert_eq!(up[[0, 0, 0]], 0);
            assert_eq!(up[[0, 1, 0]], 50);
            assert_eq!(up[[1, 0, 0]], 100);
        }
    }

    #[test]
    fn test_normalize_frame() {
        let frame = array![[[0u8, 51, 255]]];
        for accel in accelerators() {
            assert_eq!(accel.normalize_frame(frame.view()), array![[[0.0f32, 0.2, 1.0]]]);
        }
    }

    #[test]
    fn test_draw_boxes_outline() {
        let frame = Array3::<u8>::zeros((20, 20, 3));
        let boxes = array![[2.0f32, 3.0, 12.0, 15.0], [5.0, 5.0, 5.0, 9.0]];
        for accel in accelerators() {
            let out = accel.draw_boxes(frame.view(), boxes.view(), [0, 255, 0], 1).unwrap();
            assert_eq!(out[[3, 7, 1]], 255);
            assert_eq!(out[[15, 7, 1]], 255);
            assert_eq!(out[[9, 2, 1]], 255);
            assert_eq!(out[[9, 12, 1]], 255);
            // Interior untouched, degenerate box skipped.
            assert_eq!(out[[9, 7, 1]], 0);
            assert_eq!(out[[7, 5, 1]], 0);
            // Input left alone.
            assert!(frame.iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_draw_boxes_in_place_matches_copying_draw() {
        let boxes = array![[1.0f32, 1.0, 8.0, 6.0], [4.0, 2.0, 15.0, 12.0]];
        for accel in accelerators() {
            let mut frame = Array3::<u8>::zeros((16, 16, 3));
            let expected = accel.draw_boxes(frame.view(), boxes.view(), [9, 8, 7], 2).unwrap();
            accel
                .draw_boxes_in_place(frame.view_mut(), boxes.view(), [9, 8, 7], 2)
                .unwrap();
            assert_eq!(frame, expected);

            let mut gray = Array3::<u8>::zeros((4, 4, 1));
            assert!(matches!(
                accel.draw_boxes_in_place(gray.view_mut(), boxes.view(), [1, 1, 1], 1),
                Err(Error::InvalidShape { .. })
            ));
        }
    }

    #[test]
    fn test_synthetic_frame_square() {
        for accel in accelerators() {
            let frame = accel.synthetic_frame(240, 320, 0.0);
            let (x, y) = kernels::synthetic_origin(240, 320, 0.0);
            assert_eq!((x, y), (120, 144));
            let green = frame.index_axis(Axis(2), 1);
            assert_eq!(green.iter().filter(|&&v| v == 255).count(), 80 * 80);
            assert_eq!(frame[[y, x, 1]], 255);
            assert_eq!(frame[[y, x, 0]], 0);
            assert_eq!(accel.synthetic_frame(240, 320, 0.0), frame);
        }
    }
}
