mod bbox;
mod camera;
mod depth;

pub use bbox::{BBox, iou, iou_batch};
pub use camera::{CameraIntrinsics, back_project};
pub use depth::{DEFAULT_REGION_DEPTH, DepthMethod, region_depth};
