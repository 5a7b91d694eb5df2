//! Track lifecycle manager: one update cycle per frame.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::geometry::{BBox, CameraIntrinsics, DepthMethod, iou_batch, region_depth};
use crate::tracker::class_names::ClassNames;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::track::{Track, TrackEntry};

/// Configuration for the [`TrackManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections scoring below this are discarded before association
    pub conf_threshold: f32,
    /// Hard cap on live tracks; extra new detections are dropped
    pub max_objects: usize,
    /// Cycles a track may go unmatched before it is evicted
    pub max_age: u32,
    /// Matches needed before a track is reported
    pub min_hits: u32,
    /// Minimum IOU for a detection to continue a track
    pub iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            max_objects: 50,
            max_age: 30,
            min_hits: 3,
            iou_threshold: 0.3,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("conf_threshold", self.conf_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Overwrite the fields that `options` sets.
    pub fn apply(&mut self, options: &TrackerOptions) {
        if let Some(v) = options.conf_threshold {
            self.conf_threshold = v;
        }
        if let Some(v) = options.max_objects {
            self.max_objects = v;
        }
        if let Some(v) = options.max_age {
            self.max_age = v;
        }
        if let Some(v) = options.min_hits {
            self.min_hits = v;
        }
        if let Some(v) = options.iou_threshold {
            self.iou_threshold = v;
        }
    }
}

/// Partial update for [`TrackerConfig`]; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    pub conf_threshold: Option<f32>,
    pub max_objects: Option<usize>,
    pub max_age: Option<u32>,
    pub min_hits: Option<u32>,
    pub iou_threshold: Option<f32>,
}

/// Owns the live tracks and advances them one frame at a time.
///
/// All mutation goes through `&mut self`; the manager does no locking of
/// its own, so share it across threads only behind external synchronization.
#[derive(Debug, Clone)]
pub struct TrackManager {
    tracks: BTreeMap<u64, TrackEntry>,
    next_id: u64,
    frame_id: u64,
    config: TrackerConfig,
    class_names: ClassNames,
    intrinsics: Option<CameraIntrinsics>,
    depth_method: DepthMethod,
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            frame_id: 0,
            config,
            class_names: ClassNames::default(),
            intrinsics: None,
            depth_method: DepthMethod::Center,
        }
    }

    /// Use `names` instead of the COCO labels.
    pub fn with_class_names(mut self, names: ClassNames) -> Self {
        self.class_names = names;
        self
    }

    /// Use calibrated intrinsics instead of the estimate derived from the depth map size.
    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    /// How a box's depth is read from the depth map. Defaults to the centre sample.
    pub fn with_depth_method(mut self, method: DepthMethod) -> Self {
        self.depth_method = method;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Apply a partial configuration update. Takes effect from the next cycle.
    ///
    /// Nothing changes if the resulting configuration is invalid.
    pub fn configure(&mut self, options: &TrackerOptions) -> Result<()> {
        let mut config = self.config.clone();
        config.apply(options);
        config.validate()?;
        debug!(?config, "tracker reconfigured");
        self.config = config;
        Ok(())
    }

    /// Drop every track and restart ids from zero.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 0;
        self.frame_id = 0;
    }

    /// Number of live tracks, tentative ones included.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Cycles run since creation or the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_id
    }

    /// Snapshots of every live track, tentative ones included, by ascending id.
    pub fn live_tracks(&self) -> Vec<Track> {
        self.tracks
            .values()
            .map(|t| t.snapshot(&self.class_names))
            .collect()
    }

    /// Snapshots of the confirmed tracks, by ascending id.
    pub fn confirmed_tracks(&self) -> Vec<Track> {
        self.tracks
            .values()
            .filter(|t| t.is_confirmed())
            .map(|t| t.snapshot(&self.class_names))
            .collect()
    }

    /// Run one cycle and return the confirmed tracks.
    ///
    /// `dt` is the time in seconds since the previous cycle; velocity is only
    /// updated when it is positive.
    pub fn update(
        &mut self,
        detections: &[Detection],
        depth: ArrayView2<f32>,
        dt: f32,
    ) -> Vec<Track> {
        self.frame_id += 1;
        let min_hits = self.config.min_hits;

        // Step 1: Greedy IOU association against every live track
        let track_ids: Vec<u64> = self.tracks.keys().copied().collect();
        let track_rects: Vec<BBox> = self.tracks.values().map(|t| t.bbox).collect();
        let det_rects: Vec<BBox> = detections.iter().map(|d| d.bbox).collect();
        let ious = iou_batch(&det_rects, &track_rects);

        let AssignmentResult {
            matches,
            unmatched_detections,
            unmatched_tracks,
        } = matching::greedy_assignment(&ious, self.config.iou_threshold);

        // Step 2: Update matched tracks
        for &(idet, itracked) in &matches {
            let det = &detections[idet];
            let position = self.locate(&det.bbox, depth);
            let track_id = track_ids[itracked];
            if let Some(track) = self.tracks.get_mut(&track_id) {
                if track.update(det, position, dt, min_hits) {
                    debug!(track_id, hits = track.hits, "track confirmed");
                }
            }
        }

        // Step 3: Init new tracks, up to the capacity limit
        for (n, &idet) in unmatched_detections.iter().enumerate() {
            if self.tracks.len() >= self.config.max_objects {
                debug!(
                    dropped = unmatched_detections.len() - n,
                    max_objects = self.config.max_objects,
                    "track capacity reached"
                );
                break;
            }
            let det = &detections[idet];
            let position = self.locate(&det.bbox, depth);
            let track_id = self.next_id;
            self.next_id += 1;

            let entry = TrackEntry::new(track_id, det, position, min_hits);
            debug!(track_id, class_id = det.class_id, z = position.z, "track created");
            self.tracks.insert(track_id, entry);
        }

        // Step 4: Age tracks nothing matched
        for &itracked in &unmatched_tracks {
            if let Some(track) = self.tracks.get_mut(&track_ids[itracked]) {
                track.mark_missed();
            }
        }

        // Step 5: Evict stale tracks in a single pass
        let max_age = self.config.max_age;
        self.tracks.retain(|&track_id, track| {
            let keep = track.age <= max_age;
            if !keep {
                debug!(track_id, age = track.age, "track evicted");
            }
            keep
        });

        // Step 5b: Promote against the current min_hits
        for (&track_id, track) in self.tracks.iter_mut() {
            if track.promote(min_hits) {
                debug!(track_id, hits = track.hits, "track confirmed");
            }
        }

        trace!(
            frame = self.frame_id,
            detections = detections.len(),
            matched = matches.len(),
            live = self.tracks.len(),
            "update cycle finished"
        );

        // Step 6: Emit confirmed tracks
        self.confirmed_tracks()
    }

    /// Camera-frame position of the box centre.
    fn locate(&self, bbox: &BBox, depth: ArrayView2<f32>) -> Vector3<f32> {
        let z = region_depth(bbox, depth, self.depth_method);
        let (h, w) = depth.dim();
        let intrinsics = match self.intrinsics {
            Some(intrinsics) => intrinsics,
            // No pixels to derive a focal length from
            None if h == 0 || w == 0 => return Vector3::new(0.0, 0.0, z),
            None => CameraIntrinsics::from_image_size(w, h),
        };
        let (u, v) = bbox.center();
        intrinsics.back_project(u, v, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackState;
    use ndarray::Array2;

    fn flat_depth(z: f32) -> Array2<f32> {
        Array2::from_elem((480, 640), z)
    }

    fn det_at(x: f32, y: f32) -> Detection {
        Detection::new(x, y, x + 100.0, y + 100.0, 0.9, 0)
    }

    #[test]
    fn test_confirmed_exactly_at_min_hits() {
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 3,
            ..TrackerConfig::default()
        });
        let depth = flat_depth(2.0);

        for cycle in 1..=5u32 {
            let tracks = manager.update(&[det_at(100.0, 100.0)], depth.view(), 0.1);
            let live = manager.live_tracks();
            assert_eq!(live.len(), 1);
            assert_eq!(live[0].hits, cycle);
            assert_eq!(live[0].frames_tracked, cycle);
            assert_eq!(live[0].age, 0);
            assert_eq!(tracks.len(), usize::from(cycle >= 3));
        }
    }

    #[test]
    fn test_position_from_depth() {
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        });
        // Centre of the box is the principal point (320, 240).
        let tracks = manager.update(
            &[Detection::new(270.0, 190.0, 370.0, 290.0, 0.9, 0)],
            flat_depth(4.0).view(),
            0.0,
        );
        assert_eq!(tracks[0].position, Vector3::new(0.0, 0.0, 4.0));

        // 256 px right of centre at fx = 512 is half the depth.
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        });
        let tracks = manager.update(
            &[Detection::new(526.0, 190.0, 626.0, 290.0, 0.9, 0)],
            flat_depth(4.0).view(),
            0.0,
        );
        assert!((tracks[0].x() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_calibrated_intrinsics_and_depth_method() {
        let mut depth = flat_depth(5.0);
        depth[[150, 150]] = 1.5;
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        })
        .with_intrinsics(CameraIntrinsics::new(100.0, 100.0, 150.0, 150.0))
        .with_depth_method(DepthMethod::Min);

        let tracks = manager.update(&[det_at(100.0, 100.0)], depth.view(), 0.0);
        assert_eq!(tracks[0].position, Vector3::new(0.0, 0.0, 1.5));
    }

    #[test]
    fn test_capacity_drops_extra_detections() {
        let mut manager = TrackManager::new(TrackerConfig {
            max_objects: 2,
            min_hits: 1,
            ..TrackerConfig::default()
        });
        let dets = [det_at(0.0, 0.0), det_at(200.0, 0.0), det_at(400.0, 0.0)];
        let tracks = manager.update(&dets, flat_depth(2.0).view(), 0.0);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].bbox, dets[0].bbox);
        assert_eq!(tracks[1].bbox, dets[1].bbox);
    }

    #[test]
    fn test_aging_keeps_state_and_evicts() {
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 1,
            max_age: 2,
            ..TrackerConfig::default()
        });
        let depth = flat_depth(2.0);
        manager.update(&[det_at(100.0, 100.0)], depth.view(), 0.1);
        manager.update(&[det_at(102.0, 100.0)], depth.view(), 0.1);
        let before = manager.live_tracks()[0].clone();

        for age in 1..=2 {
            let tracks = manager.update(&[], depth.view(), 0.1);
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].age, age);
            assert_eq!(tracks[0].hits, before.hits);
            assert_eq!(tracks[0].position, before.position);
            assert_eq!(tracks[0].velocity, before.velocity);
        }
        assert!(manager.update(&[], depth.view(), 0.1).is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_configure_is_partial_and_validated() {
        let mut manager = TrackManager::default();
        manager
            .configure(&TrackerOptions {
                max_age: Some(5),
                ..TrackerOptions::default()
            })
            .unwrap();
        assert_eq!(manager.config().max_age, 5);
        assert_eq!(manager.config().min_hits, 3);

        let err = manager.configure(&TrackerOptions {
            min_hits: Some(1),
            iou_threshold: Some(1.5),
            ..TrackerOptions::default()
        });
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
        assert_eq!(manager.config().min_hits, 3);
    }

    #[test]
    fn test_lowered_min_hits_confirms_without_new_match() {
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 3,
            ..TrackerConfig::default()
        });
        let depth = flat_depth(2.0);
        for _ in 0..2 {
            assert!(manager.update(&[det_at(100.0, 100.0)], depth.view(), 0.1).is_empty());
        }

        manager
            .configure(&TrackerOptions {
                min_hits: Some(2),
                ..TrackerOptions::default()
            })
            .unwrap();
        let tracks = manager.update(&[], depth.view(), 0.1);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].hits, 2);
        assert_eq!(tracks[0].age, 1);
        assert_eq!(tracks[0].state, TrackState::Confirmed);

        // Raising it again does not hide the track
        manager
            .configure(&TrackerOptions {
                min_hits: Some(5),
                ..TrackerOptions::default()
            })
            .unwrap();
        assert_eq!(manager.update(&[], depth.view(), 0.1).len(), 1);
    }

    #[test]
    fn test_empty_depth_map_gives_finite_position() {
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        });
        let depth = Array2::<f32>::zeros((0, 0));
        let tracks = manager.update(&[det_at(10.0, 10.0)], depth.view(), 0.0);
        assert_eq!(tracks[0].position, Vector3::new(0.0, 0.0, 1.0));
        assert!(tracks[0].position.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_reset_restarts_ids() {
        let mut manager = TrackManager::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        });
        let depth = flat_depth(2.0);
        manager.update(&[det_at(0.0, 0.0), det_at(300.0, 0.0)], depth.view(), 0.0);
        assert_eq!(manager.len(), 2);

        manager.reset();
        assert!(manager.is_empty());
        assert_eq!(manager.frame_count(), 0);
        let tracks = manager.update(&[det_at(0.0, 0.0)], depth.view(), 0.0);
        assert_eq!(tracks[0].id, 0);
    }
}
