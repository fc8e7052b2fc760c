//! Circle geometry shared by detection merging and collision gating, plus
//! the table outline used for rail and off-table checks.
//!
//! All quantities are in image pixels.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A detected ball footprint: centre and radius in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl Circle {
    pub fn new(x: f64, y: f64, r: f64) -> Self {
        Self { x, y, r }
    }

    pub fn area(&self) -> f64 {
        PI * self.r * self.r
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Euclidean distance between two centres
pub fn distance(a: &Circle, b: &Circle) -> f64 {
    point_distance(a.center(), b.center())
}

pub fn point_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Area shared by two circles
pub fn intersection_area(a: &Circle, b: &Circle) -> f64 {
    let d = distance(a, b);
    let (r1, r2) = (a.r, b.r);

    if d >= r1 + r2 {
        return 0.0;
    }
    if d <= (r1 - r2).abs() {
        let r = r1.min(r2);
        return PI * r * r;
    }

    // Lens: two circular segments
    let r1_sq = r1 * r1;
    let r2_sq = r2 * r2;
    let cos_theta1 = ((d * d + r1_sq - r2_sq) / (2.0 * d * r1)).clamp(-1.0, 1.0);
    let cos_theta2 = ((d * d + r2_sq - r1_sq) / (2.0 * d * r2)).clamp(-1.0, 1.0);
    let theta1 = cos_theta1.acos();
    let theta2 = cos_theta2.acos();

    let sector1 = r1_sq * theta1;
    let sector2 = r2_sq * theta2;
    let triangle1 = 0.5 * r1_sq * (2.0 * theta1).sin();
    let triangle2 = 0.5 * r2_sq * (2.0 * theta2).sin();

    sector1 + sector2 - triangle1 - triangle2
}

/// Circle-overlap ratio: intersection / union, 0 when the union is empty
pub fn circle_iou(a: &Circle, b: &Circle) -> f64 {
    let intersection = intersection_area(a, b);
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

// =============================================================================
// Table outline
// =============================================================================

/// Cushion of the table, as seen by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    Left,
    Right,
    Top,
    Bottom,
}

/// Playing-surface edges in image pixels (the cushion noses)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableBounds {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl TableBounds {
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Self {
        Self { left, right, top, bottom }
    }

    /// Rail within `margin` of the point, checked left, right, top, bottom
    pub fn rail_near(&self, x: f64, y: f64, margin: f64) -> Option<Rail> {
        if (x - self.left).abs() <= margin {
            Some(Rail::Left)
        } else if (x - self.right).abs() <= margin {
            Some(Rail::Right)
        } else if (y - self.top).abs() <= margin {
            Some(Rail::Top)
        } else if (y - self.bottom).abs() <= margin {
            Some(Rail::Bottom)
        } else {
            None
        }
    }

    /// Centre beyond the outline grown by `margin` on every side
    pub fn is_outside(&self, x: f64, y: f64, margin: f64) -> bool {
        x < self.left - margin
            || x > self.right + margin
            || y < self.top - margin
            || y > self.bottom + margin
    }
}
