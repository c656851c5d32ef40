use serde::{Deserialize, Serialize};

/// A face as RetinaFace reports it: corners in original image pixels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FoundFace {
    pub bbox: [f32; 4],
    pub score: f32,
}

/// Axis-aligned face rectangle in whole pixels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl FoundFace {
    /// Rounds the corners and clamps them into a `width` x `height` image.
    pub fn bounding_box(&self, width: u32, height: u32) -> BoundingBox {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        let x1 = clamp(self.bbox[0], width);
        let y1 = clamp(self.bbox[1], height);
        let x2 = clamp(self.bbox[2], width);
        let y2 = clamp(self.bbox[3], height);
        BoundingBox {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        }
    }
}
