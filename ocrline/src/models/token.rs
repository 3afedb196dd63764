use serde::{Deserialize, Serialize};

use super::EngineKind;

/// Axis-aligned rectangle in pixel coordinates with `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Builds a box from two corners in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Builds a box from a top-left corner and a size, as Tesseract reports it.
    pub fn from_xywh(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self::new(left, top, left + width.max(0.0), top + height.max(0.0))
    }

    /// Smallest rectangle enclosing a polygon. Returns `None` for an empty polygon.
    pub fn from_points(points: &[[f32; 2]]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(first[0], first[1], first[0], first[1]);
        for [x, y] in rest {
            bbox.x0 = bbox.x0.min(*x);
            bbox.y0 = bbox.y0.min(*y);
            bbox.x1 = bbox.x1.max(*x);
            bbox.y1 = bbox.y1.max(*y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Length of the shared vertical range, zero when the boxes do not overlap.
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Multiplies x coordinates by `fx` and y coordinates by `fy`.
    pub fn scaled(&self, fx: f32, fy: f32) -> BoundingBox {
        BoundingBox::new(self.x0 * fx, self.y0 * fy, self.x1 * fx, self.y1 * fy)
    }
}

/// Adapter output before normalization. Confidence is already scaled to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl RawToken {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }
}

/// A recognized text fragment in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub engine: EngineKind,
    pub line_id: usize,
}

impl Token {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Average horizontal extent of one character.
    pub fn char_width(&self) -> f32 {
        self.bbox.width() / self.char_count().max(1) as f32
    }

    /// Horizontal distance from the end of `self` to the start of `next`.
    /// Negative when the boxes overlap.
    pub fn gap_to(&self, next: &Token) -> f32 {
        next.bbox.x0 - self.bbox.x1
    }

    /// Concatenates `next` onto `self` without a separator. The bbox is the union
    /// of both and the confidence is weighted by character count.
    pub fn merged_with(&self, next: &Token) -> Token {
        let left_len = self.char_count() as f32;
        let right_len = next.char_count() as f32;
        let total = left_len + right_len;
        let confidence = if total > 0.0 {
            (self.confidence * left_len + next.confidence * right_len) / total
        } else {
            (self.confidence + next.confidence) / 2.0
        };

        let mut text = String::with_capacity(self.text.len() + next.text.len());
        text.push_str(&self.text);
        text.push_str(&next.text);

        Token {
            text,
            bbox: self.bbox.union(&next.bbox),
            confidence,
            engine: self.engine,
            line_id: self.line_id,
        }
    }
}
