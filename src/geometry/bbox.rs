/// Axis-aligned bounding box in pixel coordinates, stored in TLBR form.
///
/// Supports three common bounding box formats:
/// - TLBR: Top-Left X, Top-Left Y, Bottom-Right X, Bottom-Right Y
/// - TLWH: Top-Left X, Top-Left Y, Width, Height
/// - XYWH: Center X, Center Y, Width, Height
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BBox {
    /// Top-left x coordinate
    pub x1: f32,
    /// Top-left y coordinate
    pub y1: f32,
    /// Bottom-right x coordinate
    pub x2: f32,
    /// Bottom-right y coordinate
    pub y2: f32,
}

impl BBox {
    /// Create a new box from corner coordinates (TLBR format).
    #[inline]
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a box from TLWH format (top-left x, top-left y, width, height).
    #[inline]
    pub fn from_tlwh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + width,
            y2: y + height,
        }
    }

    /// Create a box from XYWH format (center x, center y, width, height).
    #[inline]
    pub fn from_xywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    /// Create a box from a `[x1, y1, x2, y2]` row.
    #[inline]
    pub fn from_array(tlbr: [f32; 4]) -> Self {
        Self::new(tlbr[0], tlbr[1], tlbr[2], tlbr[3])
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Convert to TLWH format: (x, y, width, height).
    #[inline]
    pub fn to_tlwh(&self) -> [f32; 4] {
        [self.x1, self.y1, self.width(), self.height()]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Get the area of the bounding box. Inverted boxes report a non-positive area.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// A box with non-positive width or height covers no pixels.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    ///
    /// Disjoint or degenerate boxes yield `0.0`.
    pub fn iou(&self, other: &BBox) -> f32 {
        if self.is_degenerate() || other.is_degenerate() {
            return 0.0;
        }

        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter_width = (x2 - x1).max(0.0);
        let inter_height = (y2 - y1).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            (inter_area / union_area).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Intersection over Union of two boxes. See [`BBox::iou`].
#[inline]
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    a.iou(b)
}

use ndarray::Array2;

/// Calculate IoU matrix between two sets of bounding boxes.
///
/// Returns a matrix of shape (M, N) where M is the length of `boxes_a`
/// and N is the length of `boxes_b`.
pub fn iou_batch(boxes_a: &[BBox], boxes_b: &[BBox]) -> Array2<f32> {
    let mut ious = Array2::zeros((boxes_a.len(), boxes_b.len()));
    for (i, a) in boxes_a.iter().enumerate() {
        for (j, b) in boxes_b.iter().enumerate() {
            ious[[i, j]] = a.iou(b);
        }
    }
    ious
}
