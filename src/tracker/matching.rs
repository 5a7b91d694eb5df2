//! Matching utilities for multi-object tracking.

use ndarray::Array2;

use crate::geometry::BBox;

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box in TLBR format (x1, y1, x2, y2)
    pub bbox: BBox,
    /// Detection confidence score
    pub score: f32,
    /// Class index reported by the detector
    pub class_id: u32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: u32) -> Self {
        Self {
            bbox: BBox::new(x1, y1, x2, y2),
            score,
            class_id,
        }
    }

    pub fn from_bbox(bbox: BBox, score: f32, class_id: u32) -> Self {
        Self {
            bbox,
            score,
            class_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// `(detection index, track column)` pairs in the order they were committed
    pub matches: Vec<(usize, usize)>,
    pub unmatched_detections: Vec<usize>,
    pub unmatched_tracks: Vec<usize>,
}

/// Greedy IOU assignment over a `detections × tracks` matrix.
///
/// Repeatedly commits the highest remaining pair until it falls below
/// `thresh` or one side runs out. Equal values resolve to the pair seen first
/// in row-major order: lowest detection index, then lowest track column.
/// This is not an optimal assignment.
pub fn greedy_assignment(ious: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_dets, num_tracks) = ious.dim();

    let mut det_free = vec![true; num_dets];
    let mut track_free = vec![true; num_tracks];
    let mut matches = Vec::new();

    loop {
        let mut best: Option<(usize, usize)> = None;
        let mut best_iou = -1.0f32;

        for i in (0..num_dets).filter(|&i| det_free[i]) {
            for j in (0..num_tracks).filter(|&j| track_free[j]) {
                let iou = ious[[i, j]];
                if iou > best_iou {
                    best_iou = iou;
                    best = Some((i, j));
                }
            }
        }

        match best {
            Some((i, j)) if best_iou >= thresh => {
                matches.push((i, j));
                det_free[i] = false;
                track_free[j] = false;
            }
            _ => break,
        }
    }

    let collect_free = |free: &[bool]| -> Vec<usize> {
        free.iter()
            .enumerate()
            .filter_map(|(i, &f)| if f { Some(i) } else { None })
            .collect()
    };

    AssignmentResult {
        matches,
        unmatched_detections: collect_free(&det_free),
        unmatched_tracks: collect_free(&track_free),
    }
}
