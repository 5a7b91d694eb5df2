mod class_names;
mod matching;
mod track;
mod track_manager;
mod track_state;

pub use class_names::{COCO_CLASS_NAMES, ClassNames};
pub use matching::{AssignmentResult, Detection, greedy_assignment};
pub use track::Track;
pub use track_manager::{TrackManager, TrackerConfig, TrackerOptions};
pub use track_state::TrackState;
