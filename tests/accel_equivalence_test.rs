//! The native and portable backends must agree bit for bit.
#![cfg(feature = "native")]

use ndarray::{Array1, Array2, Array3};
use track3d_rs::{Accelerator, BackendKind, CameraIntrinsics};

fn backends() -> (Accelerator, Accelerator) {
    let native = Accelerator::with_backend(BackendKind::Native);
    assert!(native.is_native());
    (native, Accelerator::with_backend(BackendKind::Portable))
}

// Deterministic noise; no RNG needed
fn noise(i: usize) -> u32 {
    let mut x = i as u32 ^ 0x9e37_79b9;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}

fn frame(h: usize, w: usize) -> Array3<u8> {
    Array3::from_shape_fn((h, w, 3), |(y, x, c)| (noise(y * w * 3 + x * 3 + c) & 0xff) as u8)
}

fn depth(h: usize, w: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(y, x)| 0.5 + (noise(y * w + x) % 1000) as f32 / 100.0)
}

#[test]
fn test_frame_ops_agree() {
    let (native, portable) = backends();
    let frame = frame(37, 53);

    assert_eq!(
        native.bgr_to_rgb(frame.view()).unwrap(),
        portable.bgr_to_rgb(frame.view()).unwrap()
    );
    assert_eq!(native.normalize_frame(frame.view()), portable.normalize_frame(frame.view()));
    for (h, w) in [(10, 10), (74, 106), (37, 1), (1, 90)] {
        assert_eq!(
            native.resize_bilinear(frame.view(), h, w),
            portable.resize_bilinear(frame.view(), h, w),
            "resize to {h}x{w}"
        );
    }
    for t in [0.0, 0.7, 3.1] {
        assert_eq!(native.synthetic_frame(120, 160, t), portable.synthetic_frame(120, 160, t));
    }
}

#[test]
fn test_depth_ops_agree() {
    let (native, portable) = backends();
    let depth = depth(41, 29);
    let intrinsics = CameraIntrinsics::from_image_size(29, 41);

    let n = native.normalize_depth(depth.view());
    assert_eq!(n, portable.normalize_depth(depth.view()));
    assert_eq!(native.depth_colormap(n.view()), portable.depth_colormap(n.view()));
    assert_eq!(
        native.depth_to_pointcloud(depth.view(), &intrinsics),
        portable.depth_to_pointcloud(depth.view(), &intrinsics)
    );
}

#[test]
fn test_detection_ops_agree() {
    let (native, portable) = backends();
    let n = 60;
    let boxes = Array2::from_shape_fn((n, 4), |(i, j)| {
        let x = (noise(i) % 400) as f32;
        let y = (noise(i + 1000) % 300) as f32;
        match j {
            0 => x,
            1 => y,
            2 => x + 20.0 + (noise(i + 2000) % 60) as f32,
            _ => y + 20.0 + (noise(i + 3000) % 60) as f32,
        }
    });
    // Coarse scores so ties occur
    let scores = Array1::from_shape_fn(n, |i| (noise(i + 4000) % 10) as f32 / 10.0);
    let class_ids = Array1::from_shape_fn(n, |i| noise(i + 5000) % 5);

    for thr in [0.0, 0.3, 0.7] {
        assert_eq!(
            native.nms(boxes.view(), scores.view(), thr).unwrap(),
            portable.nms(boxes.view(), scores.view(), thr).unwrap()
        );
    }
    assert_eq!(
        native.filter_by_score(boxes.view(), scores.view(), class_ids.view(), 0.5).unwrap(),
        portable.filter_by_score(boxes.view(), scores.view(), class_ids.view(), 0.5).unwrap()
    );

    let canvas = Array3::<u8>::zeros((400, 500, 3));
    assert_eq!(
        native.draw_boxes(canvas.view(), boxes.view(), [0, 255, 0], 2).unwrap(),
        portable.draw_boxes(canvas.view(), boxes.view(), [0, 255, 0], 2).unwrap()
    );
}
