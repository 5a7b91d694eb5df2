//! Per-row kernels shared by both backends.
//!
//! The native backend only changes how rows are scheduled, so both backends
//! produce bit-identical output.

use std::cmp::Ordering;
use std::sync::OnceLock;

use ndarray::{ArrayView1, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3};

use crate::geometry::{BBox, CameraIntrinsics};

/// Depth ranges narrower than this normalize to all zeros.
pub(crate) const DEPTH_RANGE_EPSILON: f32 = 1e-9;

/// Side length of the square drawn by the synthetic frame generator.
pub(crate) const SYNTHETIC_SQUARE: usize = 80;

/// Reverse the channel order of one row of a `W×3` frame.
#[inline]
pub(crate) fn swap_row(src: ArrayView2<u8>, mut dst: ArrayViewMut2<u8>) {
    for (s, mut d) in src.outer_iter().zip(dst.outer_iter_mut()) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
    }
}

/// Scale factors from output to source coordinates.
#[inline]
pub(crate) fn resize_ratios(h: usize, w: usize, new_h: usize, new_w: usize) -> (f64, f64) {
    (h as f64 / new_h as f64, w as f64 / new_w as f64)
}

/// Fill output row `i` of a bilinear resize.
///
/// Source coordinates are `i * ratio` with no half-pixel offset. `src` must
/// have at least one row and one column.
pub(crate) fn resize_row(
    src: ArrayView3<u8>,
    i: usize,
    ratios: (f64, f64),
    mut dst: ArrayViewMut2<u8>,
) {
    let (h, w, c) = src.dim();
    let (row_ratio, col_ratio) = ratios;

    let y_f = i as f64 * row_ratio;
    let y0 = (y_f as usize).min(h.saturating_sub(2));
    let y1 = (y0 + 1).min(h - 1);
    let fy = (y_f - y0 as f64) as f32;

    for (j, mut px) in dst.outer_iter_mut().enumerate() {
        let x_f = j as f64 * col_ratio;
        let x0 = (x_f as usize).min(w.saturating_sub(2));
        let x1 = (x0 + 1).min(w - 1);
        let fx = (x_f - x0 as f64) as f32;

        for k in 0..c {
            let tl = src[[y0, x0, k]] as f32;
            let tr = src[[y0, x1, k]] as f32;
            let bl = src[[y1, x0, k]] as f32;
            let br = src[[y1, x1, k]] as f32;

            let top = tl * (1.0 - fx) + tr * fx;
            let bot = bl * (1.0 - fx) + br * fx;
            let val = top * (1.0 - fy) + bot * fy;
            px[k] = val.clamp(0.0, 255.0) as u8;
        }
    }
}

/// Minimum and maximum of a row, ignoring NaN.
#[inline]
pub(crate) fn row_range(row: ArrayView1<f32>) -> (f32, f32) {
    row.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

#[inline]
pub(crate) fn merge_range(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    (a.0.min(b.0), a.1.max(b.1))
}

/// Rescale one depth sample into `[0, 255]` given the map's min and range.
#[inline]
pub(crate) fn normalize_depth_value(v: f32, d_min: f32, range: f32) -> u8 {
    ((v - d_min) / range * 255.0).clamp(0.0, 255.0) as u8
}

/// The 256-entry JET palette in BGR order.
pub(crate) fn jet_lut() -> &'static [[u8; 3]; 256] {
    static LUT: OnceLock<[[u8; 3]; 256]> = OnceLock::new();
    LUT.get_or_init(build_jet_lut)
}

fn build_jet_lut() -> [[u8; 3]; 256] {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let t = i as f32 / 255.0;

        let r = if t < 0.375 {
            0.0
        } else if t < 0.625 {
            (t - 0.375) / 0.25
        } else if t < 0.875 {
            1.0
        } else {
            1.0 - (t - 0.875) / 0.25
        };

        let g = if t < 0.125 {
            0.0
        } else if t < 0.375 {
            (t - 0.125) / 0.25
        } else if t < 0.625 {
            1.0
        } else if t < 0.875 {
            1.0 - (t - 0.625) / 0.25
        } else {
            0.0
        };

        let b = if t < 0.125 {
            0.5 + t / 0.125 * 0.5
        } else if t < 0.375 {
            1.0
        } else if t < 0.625 {
            1.0 - (t - 0.375) / 0.25
        } else {
            0.0
        };

        *entry = [
            (b.clamp(0.0, 1.0) * 255.0) as u8,
            (g.clamp(0.0, 1.0) * 255.0) as u8,
            (r.clamp(0.0, 1.0) * 255.0) as u8,
        ];
    }
    lut
}

/// Map one row of normalized depth through the JET palette.
#[inline]
pub(crate) fn colormap_row(src: ArrayView1<u8>, mut dst: ArrayViewMut2<u8>) {
    let lut = jet_lut();
    for (&v, mut px) in src.iter().zip(dst.outer_iter_mut()) {
        let color = lut[v as usize];
        px[0] = color[0];
        px[1] = color[1];
        px[2] = color[2];
    }
}

/// Back-project depth row `i` into `W` consecutive rows of the point cloud.
#[inline]
pub(crate) fn pointcloud_row(
    depth: ArrayView1<f32>,
    i: usize,
    k: &CameraIntrinsics,
    mut dst: ArrayViewMut2<f32>,
) {
    for (j, (&z, mut point)) in depth.iter().zip(dst.outer_iter_mut()).enumerate() {
        point[0] = (j as f32 - k.cx) * z / k.fx;
        point[1] = (i as f32 - k.cy) * z / k.fy;
        point[2] = z;
    }
}

/// Candidate order for NMS: score descending, ties by lower index, NaN last.
pub(crate) fn score_order(scores: ArrayView1<f32>) -> Vec<usize> {
    let key = |i: usize| {
        let s = scores[i];
        if s.is_nan() { f32::NEG_INFINITY } else { s }
    };
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    order
}

/// Greedy suppression over a precomputed candidate order.
///
/// `iou(i, j)` is queried only for candidates that are still alive.
pub(crate) fn greedy_suppress(
    order: &[usize],
    iou_threshold: f32,
    mut iou: impl FnMut(usize, usize) -> f32,
) -> Vec<usize> {
    let n = order.len();
    let mut suppressed = vec![false; n];
    let mut keep = Vec::with_capacity(n);

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[pos] {
            continue;
        }
        keep.push(i);

        for (rest, &j) in order.iter().enumerate().skip(pos + 1) {
            if !suppressed[rest] && iou(i, j) > iou_threshold {
                suppressed[rest] = true;
            }
        }
    }

    keep
}

/// Outline `bbox` on `out` in place.
///
/// Corners are clamped to the image; boxes that collapse after clamping are
/// skipped. Each edge band is `min(thickness, extent)` pixels wide.
pub(crate) fn draw_box(out: &mut ArrayViewMut3<u8>, bbox: &BBox, color: [u8; 3], thickness: usize) {
    let (h, w, _) = out.dim();
    if h == 0 || w == 0 {
        return;
    }
    let clamp = |v: f32, limit: usize| (v as isize).clamp(0, limit as isize - 1) as usize;
    let x1 = clamp(bbox.x1, w);
    let y1 = clamp(bbox.y1, h);
    let x2 = clamp(bbox.x2, w);
    let y2 = clamp(bbox.y2, h);

    if x2 <= x1 || y2 <= y1 {
        return;
    }

    let mut paint = |y: usize, x: usize| {
        for (k, &c) in color.iter().enumerate() {
            out[[y, x, k]] = c;
        }
    };

    for dy in 0..thickness.min(y2 - y1) {
        for x in x1..=x2 {
            paint(y1 + dy, x);
            paint(y2 - dy, x);
        }
    }
    for dx in 0..thickness.min(x2 - x1) {
        for y in y1..=y2 {
            paint(y, x1 + dx);
            paint(y, x2 - dx);
        }
    }
}

/// Top-left corner of the synthetic square at time `t`.
#[inline]
pub(crate) fn synthetic_origin(h: usize, w: usize, t: f64) -> (usize, usize) {
    let side = SYNTHETIC_SQUARE as f64;
    let x = ((t.sin() * 0.4 + 0.5) * (w as f64 - side)) as usize;
    let y = ((t.cos() * 0.4 + 0.5) * (h as f64 - side)) as usize;
    (x, y)
}

/// Fill row `i` of a synthetic frame: green inside the square, black elsewhere.
#[inline]
pub(crate) fn synthetic_row(i: usize, origin: (usize, usize), mut dst: ArrayViewMut2<u8>) {
    let (x, y) = origin;
    if i < y || i >= y + SYNTHETIC_SQUARE {
        return;
    }
    let x_end = (x + SYNTHETIC_SQUARE).min(dst.nrows());
    for j in x.min(x_end)..x_end {
        dst[[j, 1]] = 255;
    }
}

/// Write `v / 255` for a row of 8-bit samples.
#[inline]
pub(crate) fn normalize_frame_row(src: ArrayView2<u8>, mut dst: ArrayViewMut2<f32>) {
    dst.zip_mut_with(&src, |o, &v| *o = v as f32 / 255.0);
}
