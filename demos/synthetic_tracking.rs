//! Track the moving square of the synthetic test pattern.
//!
//! Run with `RUST_LOG=track3d_rs=debug cargo run --example synthetic_tracking`
//! to see track lifecycle events.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use ndarray::{ArrayView3, Axis};
use track3d_rs::{Accelerator, Detection, DetectionSource, Tracker3D, TrackerConfig};
use tracing_subscriber::EnvFilter;

/// Boxes the bright green pixels of a BGR frame.
struct GreenDetector;

impl DetectionSource for GreenDetector {
    type Error = Infallible;

    fn detect(&mut self, frame: ArrayView3<u8>) -> Result<Vec<Detection>, Self::Error> {
        let mut extent: Option<(usize, usize, usize, usize)> = None;
        for (y, row) in frame.axis_iter(Axis(0)).enumerate() {
            for (x, px) in row.axis_iter(Axis(0)).enumerate() {
                if px[1] > 200 && px[0] < 50 && px[2] < 50 {
                    let (x1, y1, x2, y2) = extent.get_or_insert((x, y, x, y));
                    *x1 = (*x1).min(x);
                    *y1 = (*y1).min(y);
                    *x2 = (*x2).max(x + 1);
                    *y2 = (*y2).max(y + 1);
                }
            }
        }
        Ok(extent
            .map(|(x1, y1, x2, y2)| {
                Detection::new(x1 as f32, y1 as f32, x2 as f32, y2 as f32, 0.9, 0)
            })
            .into_iter()
            .collect())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let accel = Accelerator::shared();
    println!("backend: {}", accel.kind());

    let mut tracker = Tracker3D::new(
        GreenDetector,
        TrackerConfig {
            min_hits: 2,
            ..TrackerConfig::default()
        },
    )
    .with_nms(0.5);

    let start = Instant::now();
    for i in 0..30 {
        let t = i as f64 * 0.05;
        let frame = accel.synthetic_frame(480, 640, t);
        let (annotated, tracks) =
            tracker.process_at(frame.view(), start + Duration::from_secs_f64(t), true);

        for track in &tracks {
            match track.speed() {
                Some(speed) => println!("frame {i:2}: {track} speed={speed:.2}m/s"),
                None => println!("frame {i:2}: {track}"),
            }
        }
        debug_assert_eq!(annotated.dim(), frame.dim());
    }
}
