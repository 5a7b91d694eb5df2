//! Class-id to label lookup.

use std::borrow::Cow;
use std::sync::Arc;

/// The 80 COCO labels used by YOLO-family detectors, indexed by class id.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Label table shared between a tracker and the snapshots it emits.
#[derive(Debug, Clone)]
pub struct ClassNames {
    names: Arc<[String]>,
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}

impl ClassNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn coco() -> Self {
        Self::new(COCO_CLASS_NAMES)
    }

    /// Label for `class_id`, or `class_<id>` when the table has no entry.
    pub fn name(&self, class_id: u32) -> Cow<'_, str> {
        match self.names.get(class_id as usize) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("class_{class_id}")),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
