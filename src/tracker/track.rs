//! Per-track state and the snapshots handed to callers.

use std::fmt;

use nalgebra::Vector3;

use crate::geometry::BBox;
use crate::tracker::class_names::ClassNames;
use crate::tracker::matching::Detection;
use crate::tracker::track_state::TrackState;

/// Immutable view of a track at the end of an update cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Unique track identifier
    pub id: u64,
    /// Camera-frame position in meters (x right, y down, z forward)
    pub position: Vector3<f32>,
    /// Last matched bounding box
    pub bbox: BBox,
    pub class_id: u32,
    pub class_name: String,
    /// Score of the last matched detection
    pub confidence: f32,
    /// m/s, unset until the track has been observed twice with time advancing
    pub velocity: Option<Vector3<f32>>,
    /// True only in the cycle the track was created
    pub is_new: bool,
    /// Frames with a successful observation, including the first
    pub frames_tracked: u32,
    /// Successful matches since creation
    pub hits: u32,
    /// Cycles since the last successful match
    pub age: u32,
    pub state: TrackState,
}

impl Track {
    pub fn x(&self) -> f32 {
        self.position.x
    }

    pub fn y(&self) -> f32 {
        self.position.y
    }

    /// Distance along the optical axis.
    pub fn z(&self) -> f32 {
        self.position.z
    }

    /// Magnitude of the velocity in m/s.
    pub fn speed(&self) -> Option<f32> {
        self.velocity.map(|v| v.norm())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Track(id={}, class={}, pos=({:.2}, {:.2}, {:.2}m), conf={:.2}, frames={})",
            self.id,
            self.class_name,
            self.position.x,
            self.position.y,
            self.position.z,
            self.confidence,
            self.frames_tracked
        )
    }
}

/// Mutable per-track bookkeeping owned by the tracker.
#[derive(Debug, Clone)]
pub(crate) struct TrackEntry {
    pub(crate) track_id: u64,
    pub(crate) state: TrackState,
    pub(crate) bbox: BBox,
    pub(crate) class_id: u32,
    pub(crate) score: f32,
    pub(crate) position: Vector3<f32>,
    pub(crate) velocity: Option<Vector3<f32>>,
    pub(crate) hits: u32,
    pub(crate) age: u32,
    pub(crate) frames_tracked: u32,
    pub(crate) is_new: bool,
}

impl TrackEntry {
    /// Start a track from an unmatched detection.
    pub(crate) fn new(
        track_id: u64,
        det: &Detection,
        position: Vector3<f32>,
        min_hits: u32,
    ) -> Self {
        let mut entry = Self {
            track_id,
            state: TrackState::Tentative,
            bbox: det.bbox,
            class_id: det.class_id,
            score: det.score,
            position,
            velocity: None,
            hits: 1,
            age: 0,
            frames_tracked: 1,
            is_new: true,
        };
        entry.promote(min_hits);
        entry
    }

    /// Apply a matched detection observed `dt` seconds after the previous one.
    ///
    /// Returns true when this observation confirmed the track.
    pub(crate) fn update(
        &mut self,
        det: &Detection,
        position: Vector3<f32>,
        dt: f32,
        min_hits: u32,
    ) -> bool {
        self.bbox = det.bbox;
        self.score = det.score;
        self.class_id = det.class_id;

        if dt > 0.0 {
            self.velocity = Some((position - self.position) / dt);
        }
        self.position = position;

        self.hits += 1;
        self.frames_tracked += 1;
        self.age = 0;
        self.is_new = false;

        self.promote(min_hits)
    }

    /// Nothing matched this track in the current cycle.
    pub(crate) fn mark_missed(&mut self) {
        self.age += 1;
        self.is_new = false;
    }

    pub(crate) fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    /// Confirm the track once it has `min_hits` hits. Never demotes.
    pub(crate) fn promote(&mut self, min_hits: u32) -> bool {
        if self.state == TrackState::Tentative && self.hits >= min_hits {
            self.state = TrackState::Confirmed;
            return true;
        }
        false
    }

    pub(crate) fn snapshot(&self, class_names: &ClassNames) -> Track {
        Track {
            id: self.track_id,
            position: self.position,
            bbox: self.bbox,
            class_id: self.class_id,
            class_name: class_names.name(self.class_id).into_owned(),
            confidence: self.score,
            velocity: self.velocity,
            is_new: self.is_new,
            frames_tracked: self.frames_tracked,
            hits: self.hits,
            age: self.age,
            state: self.state,
        }
    }
}
