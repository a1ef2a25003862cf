use serde::{Deserialize, Serialize};
use tessel_core::Entity;

/// Axis-aligned rectangle with its origin at the top-left corner.
///
/// Containment and intersection are inclusive of every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Rect {
    /// Create a rectangle from its top-left corner and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The square of half-size `radius` centred on `(cx, cy)`.
    pub fn around(cx: f64, cy: f64, radius: f64) -> Self {
        Self::new(cx - radius, cy - radius, radius * 2.0, radius * 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether every coordinate is finite and both sides are positive.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Whether `(px, py)` lies inside or on the edge.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Whether the two rectangles overlap or touch.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    /// The four equal quadrants in NW, NE, SW, SE order.
    ///
    /// The eastern and southern quadrants take whatever remains of the
    /// parent extent, so the four together cover the parent exactly.
    pub fn quadrants(&self) -> [Rect; 4] {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let mid_x = self.x + half_w;
        let mid_y = self.y + half_h;
        let east_w = self.right() - mid_x;
        let south_h = self.bottom() - mid_y;
        [
            Rect::new(self.x, self.y, half_w, half_h),
            Rect::new(mid_x, self.y, east_w, half_h),
            Rect::new(self.x, mid_y, half_w, south_h),
            Rect::new(mid_x, mid_y, east_w, south_h),
        ]
    }
}

/// A position-tagged entity reference stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialItem {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// The entity at this position.
    pub entity: Entity,
}

impl SpatialItem {
    /// Create an item.
    pub const fn new(entity: Entity, x: f64, y: f64) -> Self {
        Self { x, y, entity }
    }

    /// Squared distance from `(px, py)`.
    pub fn distance_squared(&self, px: f64, py: f64) -> f64 {
        let dx = self.x - px;
        let dy = self.y - py;
        dx * dx + dy * dy
    }
}
