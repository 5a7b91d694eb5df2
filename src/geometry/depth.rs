//! Reduce the depth samples under a bounding box to a single distance.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;

use crate::error::Error;
use crate::geometry::BBox;

/// Depth returned when a box covers no pixels after clipping.
pub const DEFAULT_REGION_DEPTH: f32 = 1.0;

/// How [`region_depth`] reduces the samples inside a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthMethod {
    /// Sample at the box centroid
    #[default]
    Center,
    /// Median of the positive samples in the box
    Median,
    /// Closest positive sample in the box
    Min,
}

impl FromStr for DepthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "center" => Ok(Self::Center),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            other => Err(Error::UnknownDepthMethod(other.to_string())),
        }
    }
}

impl fmt::Display for DepthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Center => "center",
            Self::Median => "median",
            Self::Min => "min",
        })
    }
}

/// Clip a coordinate to `[0, limit - 1]` and truncate it to a pixel index.
#[inline]
fn clip(v: f32, limit: usize) -> usize {
    let max = limit.saturating_sub(1) as f32;
    v.min(max).max(0.0) as usize
}

/// Depth of the object inside `bbox`.
///
/// The box is clipped to the map and truncated to integer pixels. If nothing
/// is left, [`DEFAULT_REGION_DEPTH`] is returned. `Median` and `Min` ignore
/// non-positive samples unless the region holds nothing else.
pub fn region_depth(bbox: &BBox, depth: ArrayView2<f32>, method: DepthMethod) -> f32 {
    let (h, w) = depth.dim();
    if h == 0 || w == 0 {
        return DEFAULT_REGION_DEPTH;
    }

    let x1 = clip(bbox.x1, w);
    let y1 = clip(bbox.y1, h);
    let x2 = clip(bbox.x2, w);
    let y2 = clip(bbox.y2, h);

    if x2 <= x1 || y2 <= y1 {
        return DEFAULT_REGION_DEPTH;
    }

    match method {
        DepthMethod::Center => depth[[(y1 + y2) / 2, (x1 + x2) / 2]],
        DepthMethod::Median | DepthMethod::Min => {
            let region = depth.slice(ndarray::s![y1..y2, x1..x2]);
            let mut samples: Vec<f32> = region.iter().copied().filter(|&d| d > 0.0).collect();
            if samples.is_empty() {
                samples = region.iter().copied().collect();
            }
            if method == DepthMethod::Min {
                samples.iter().copied().fold(f32::INFINITY, f32::min)
            } else {
                median(&mut samples)
            }
        }
    }
}

/// Median of a non-empty sample set; even counts average the two middle values.
fn median(samples: &mut [f32]) -> f32 {
    samples.sort_by(f32::total_cmp);
    let n = samples.len();
    if n % 2 == 1 {
        samples[n / 2]
    } else {
        (samples[n / 2 - 1] + samples[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(i, j)| (i * w + j) as f32)
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("center".parse::<DepthMethod>(), Ok(DepthMethod::Center));
        assert_eq!("median".parse::<DepthMethod>(), Ok(DepthMethod::Median));
        assert_eq!("min".parse::<DepthMethod>(), Ok(DepthMethod::Min));
        assert_eq!(
            "mean".parse::<DepthMethod>(),
            Err(Error::UnknownDepthMethod("mean".to_string()))
        );
    }

    #[test]
    fn test_center_sample() {
        let depth = ramp(10, 10);
        let bbox = BBox::new(2.0, 2.0, 7.9, 6.0);
        // Clipped to (2, 2, 7, 6), centroid (4, 4)
        assert_eq!(region_depth(&bbox, depth.view(), DepthMethod::Center), 44.0);
    }

    #[test]
    fn test_median_and_min_skip_invalid_samples() {
        let mut depth = Array2::from_elem((4, 4), 0.0f32);
        depth[[1, 1]] = 3.0;
        depth[[1, 2]] = 5.0;
        depth[[2, 1]] = 4.0;
        depth[[2, 2]] = -1.0;
        let bbox = BBox::new(0.0, 0.0, 3.0, 3.0);

        assert_eq!(region_depth(&bbox, depth.view(), DepthMethod::Median), 4.0);
        assert_eq!(region_depth(&bbox, depth.view(), DepthMethod::Min), 3.0);
    }

    #[test]
    fn test_median_even_count() {
        let depth = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 9.0, 3.0, 4.0, 9.0]).unwrap();
        let bbox = BBox::new(0.0, 0.0, 2.0, 1.9);
        // Region rows 0..1, cols 0..2 -> [1, 2]
        assert_eq!(region_depth(&bbox, depth.view(), DepthMethod::Median), 1.5);
    }

    #[test]
    fn test_falls_back_to_all_samples() {
        let depth = Array2::from_elem((5, 5), -2.0f32);
        let bbox = BBox::new(0.0, 0.0, 4.0, 4.0);
        assert_eq!(region_depth(&bbox, depth.view(), DepthMethod::Min), -2.0);
        assert_eq!(region_depth(&bbox, depth.view(), DepthMethod::Median), -2.0);
    }

    #[test]
    fn test_degenerate_box_returns_sentinel() {
        let depth = Array2::from_elem((8, 8), 3.0f32);
        let outside = BBox::new(100.0, 100.0, 200.0, 200.0);
        let flat = BBox::new(1.0, 4.0, 6.0, 4.5);

        for method in [DepthMethod::Center, DepthMethod::Median, DepthMethod::Min] {
            assert_eq!(region_depth(&outside, depth.view(), method), DEFAULT_REGION_DEPTH);
            assert_eq!(region_depth(&flat, depth.view(), method), DEFAULT_REGION_DEPTH);
        }
    }
}
