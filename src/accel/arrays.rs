//! Columnar form of a detection batch, as consumed by the bridge.

use ndarray::{Array1, Array2};

use crate::integration::IntoDetections;
use crate::tracker::Detection;

/// Detections split into parallel arrays: `N×4` boxes, `N` scores, `N` class ids.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionArrays {
    pub boxes: Array2<f32>,
    pub scores: Array1<f32>,
    pub class_ids: Array1<u32>,
}

impl DetectionArrays {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let n = detections.len();
        let boxes = Array2::from_shape_fn((n, 4), |(i, j)| detections[i].bbox.to_tlbr()[j]);
        let scores = detections.iter().map(|d| d.score).collect();
        let class_ids = detections.iter().map(|d| d.class_id).collect();
        Self {
            boxes,
            scores,
            class_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl IntoDetections for DetectionArrays {
    fn into_detections(self) -> Vec<Detection> {
        self.boxes
            .outer_iter()
            .zip(self.scores.iter())
            .zip(self.class_ids.iter())
            .map(|((b, &score), &class_id)| Detection::new(b[0], b[1], b[2], b[3], score, class_id))
            .collect()
    }
}
