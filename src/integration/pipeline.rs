//! Tracker3D: the frame-in, tracks-out facade.

use std::sync::Arc;
use std::time::Instant;

use ndarray::{Array2, Array3, ArrayView3, arr2};
use tracing::warn;

use super::{ConstantDepth, DepthSource, DetectionSource, IntoDetections};
use crate::accel::{Accelerator, BackendKind, DetectionArrays};
use crate::error::Result;
use crate::geometry::{CameraIntrinsics, DepthMethod};
use crate::tracker::{ClassNames, Detection, Track, TrackManager, TrackerConfig, TrackerOptions};

/// Outline colours cycled by track id (BGR).
const TRACK_COLORS: [[u8; 3]; 10] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [128, 0, 255],
    [255, 128, 0],
    [0, 128, 255],
    [128, 255, 0],
];

/// Detection, depth and tracking bundled behind one call per frame.
///
/// This struct provides a convenient way to run end-to-end tracking by
/// combining any `DetectionSource` and `DepthSource` with a [`TrackManager`].
/// Without a depth source every object is placed 2 m from the camera.
///
/// Not internally synchronized: one frame is processed at a time through
/// `&mut self`.
pub struct Tracker3D<D: DetectionSource, P: DepthSource = ConstantDepth> {
    detector: D,
    depth_source: P,
    manager: TrackManager,
    accel: Arc<Accelerator>,
    nms_threshold: Option<f32>,
    last_instant: Option<Instant>,
}

impl<D: DetectionSource> Tracker3D<D, ConstantDepth> {
    /// Create a new tracker with the given detector and tracker config.
    pub fn new(detector: D, config: TrackerConfig) -> Self {
        Self {
            detector,
            depth_source: ConstantDepth::default(),
            manager: TrackManager::new(config),
            accel: Accelerator::shared(),
            nms_threshold: None,
            last_instant: None,
        }
    }

    /// Create a new tracker with default tracker configuration.
    pub fn with_default_config(detector: D) -> Self {
        Self::new(detector, TrackerConfig::default())
    }
}

impl<D: DetectionSource, P: DepthSource> Tracker3D<D, P> {
    /// Replace the depth source.
    pub fn with_depth_source<Q: DepthSource>(self, depth_source: Q) -> Tracker3D<D, Q> {
        Tracker3D {
            detector: self.detector,
            depth_source,
            manager: self.manager,
            accel: self.accel,
            nms_threshold: self.nms_threshold,
            last_instant: self.last_instant,
        }
    }

    /// Use `accel` instead of the process-wide accelerator.
    pub fn with_accelerator(mut self, accel: Arc<Accelerator>) -> Self {
        self.accel = accel;
        self
    }

    /// Run class-agnostic NMS on the detections before tracking.
    pub fn with_nms(mut self, iou_threshold: f32) -> Self {
        self.nms_threshold = Some(iou_threshold);
        self
    }

    pub fn with_class_names(mut self, names: ClassNames) -> Self {
        self.manager = self.manager.with_class_names(names);
        self
    }

    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.manager = self.manager.with_intrinsics(intrinsics);
        self
    }

    pub fn with_depth_method(mut self, method: DepthMethod) -> Self {
        self.manager = self.manager.with_depth_method(method);
        self
    }

    /// Process a frame captured now.
    ///
    /// Returns the frame (with track outlines when `draw_annotations` is set)
    /// and the confirmed tracks.
    pub fn process(
        &mut self,
        frame: ArrayView3<u8>,
        draw_annotations: bool,
    ) -> (Array3<u8>, Vec<Track>) {
        self.process_at(frame, Instant::now(), draw_annotations)
    }

    /// Process a frame captured at `now`.
    ///
    /// The time since the previous call drives velocity estimation. The first
    /// call after construction or [`reset`](Self::reset) has no reference and
    /// leaves velocities unset.
    pub fn process_at(
        &mut self,
        frame: ArrayView3<u8>,
        now: Instant,
        draw_annotations: bool,
    ) -> (Array3<u8>, Vec<Track>) {
        let dt = self
            .last_instant
            .map_or(0.0, |prev| now.saturating_duration_since(prev).as_secs_f32());
        self.last_instant = Some(now);

        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(%err, "detector failed, tracking without detections");
                Vec::new()
            }
        };
        let detections = self.prefilter(detections).unwrap_or_else(|err| {
            warn!(%err, "detection prefilter failed, dropping detections");
            Vec::new()
        });

        let depth = self.depth_map(frame);
        let tracks = self.manager.update(&detections, depth.view(), dt);

        let annotated = if draw_annotations {
            self.annotate(frame, &tracks)
        } else {
            frame.to_owned()
        };
        (annotated, tracks)
    }

    /// Drop all tracks, restart ids and forget the previous frame time.
    pub fn reset(&mut self) {
        self.manager.reset();
        self.last_instant = None;
    }

    /// Apply a partial configuration update from the next frame on.
    pub fn configure(&mut self, options: &TrackerOptions) -> Result<()> {
        self.manager.configure(options)
    }

    pub fn config(&self) -> &TrackerConfig {
        self.manager.config()
    }

    /// Backend used for filtering, NMS and drawing.
    pub fn backend_kind(&self) -> BackendKind {
        self.accel.kind()
    }

    /// Get a reference to the underlying detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Get a mutable reference to the underlying detector.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Get a reference to the underlying track manager.
    pub fn manager(&self) -> &TrackManager {
        &self.manager
    }

    /// Score threshold, then optional NMS.
    fn prefilter(&self, detections: Vec<Detection>) -> Result<Vec<Detection>> {
        if detections.is_empty() {
            return Ok(detections);
        }
        let arrays = DetectionArrays::from_detections(&detections);
        let kept = self
            .accel
            .filter_detections(&arrays, self.manager.config().conf_threshold)?;

        let Some(iou_threshold) = self.nms_threshold else {
            return Ok(kept.into_detections());
        };
        let order = self
            .accel
            .nms(kept.boxes.view(), kept.scores.view(), iou_threshold)?;
        let kept = kept.into_detections();
        Ok(order.into_iter().map(|i| kept[i].clone()).collect())
    }

    fn depth_map(&mut self, frame: ArrayView3<u8>) -> Array2<f32> {
        let (h, w, _) = frame.dim();
        match self.depth_source.estimate(frame) {
            Ok(depth) if depth.dim() == (h, w) => depth,
            Ok(depth) => {
                warn!(
                    expected = ?(h, w),
                    got = ?depth.dim(),
                    "depth map size mismatch, using placeholder"
                );
                Array2::from_elem((h, w), ConstantDepth::DEFAULT_METERS)
            }
            Err(err) => {
                warn!(%err, "depth estimation failed, using placeholder");
                Array2::from_elem((h, w), ConstantDepth::DEFAULT_METERS)
            }
        }
    }

    fn annotate(&self, frame: ArrayView3<u8>, tracks: &[Track]) -> Array3<u8> {
        let mut out = frame.to_owned();
        for track in tracks {
            let color = TRACK_COLORS[(track.id % TRACK_COLORS.len() as u64) as usize];
            let thickness = if track.is_new { 3 } else { 2 };
            let bbox = arr2(&[track.bbox.to_tlbr()]);
            if let Err(err) = self
                .accel
                .draw_boxes_in_place(out.view_mut(), bbox.view(), color, thickness)
            {
                warn!(%err, "cannot annotate frame");
                break;
            }
        }
        out
    }
}
