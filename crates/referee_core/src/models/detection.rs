//! Per-frame detector output
//!
//! A `DetectionFrame` is what the external vision model hands us once per
//! video frame. Frames are normalised before any component sees them:
//! low-confidence boxes are dropped, unknown labels are rejected, overlapping
//! boxes are merged and only the best box per label survives.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ball::BallId;
use crate::geometry::{circle_iou, Circle};

/// One detected ball in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector label: "cueball" or "bi1".."bi9"
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    #[serde(rename = "conf", alias = "confidence", default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl Detection {
    pub fn new(name: impl Into<String>, x: f64, y: f64, r: f64, confidence: f64) -> Self {
        Self { name: name.into(), x, y, r, confidence }
    }

    pub fn circle(&self) -> Circle {
        Circle::new(self.x, self.y, self.r)
    }

    /// Parsed identity, `None` for labels the referee does not know
    pub fn ball_id(&self) -> Option<BallId> {
        self.name.parse().ok()
    }
}

/// All detections for one video frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Strictly increasing across a session
    #[serde(rename = "frame_idx", alias = "frame_index")]
    pub frame_index: u64,
    /// Seconds since capture start, if the detector provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(rename = "balls", alias = "detections")]
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(frame_index: u64, detections: Vec<Detection>) -> Self {
        Self { frame_index, timestamp: None, detections }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// First detection carrying this ball's label
    pub fn get(&self, ball: BallId) -> Option<&Detection> {
        let label = ball.label();
        self.detections.iter().find(|d| d.name == label)
    }

    pub fn circle_of(&self, ball: BallId) -> Option<Circle> {
        self.get(ball).map(Detection::circle)
    }

    pub fn contains(&self, ball: BallId) -> bool {
        self.get(ball).is_some()
    }

    /// Identities present in this frame (unknown labels skipped)
    pub fn ball_ids(&self) -> Vec<BallId> {
        self.detections.iter().filter_map(Detection::ball_id).collect()
    }

    /// Clean a raw detector frame.
    ///
    /// 1. Drop detections below `confidence_floor`
    /// 2. Drop labels that are not a known ball
    /// 3. Greedy overlap merge: highest confidence wins, anything overlapping
    ///    it at `merge_iou` or more is discarded
    /// 4. Keep the best detection per label
    pub fn normalized(&self, confidence_floor: f64, merge_iou: f64) -> DetectionFrame {
        let mut candidates: Vec<Detection> = Vec::with_capacity(self.detections.len());
        for det in &self.detections {
            if det.confidence < confidence_floor {
                continue;
            }
            if det.ball_id().is_none() {
                log::warn!(
                    "frame {}: dropping detection with unknown label {:?}",
                    self.frame_index,
                    det.name
                );
                continue;
            }
            candidates.push(det.clone());
        }

        let merged = merge_overlapping(candidates, merge_iou);

        let mut best: HashMap<String, Detection> = HashMap::new();
        for det in merged {
            match best.get(&det.name) {
                Some(existing) if existing.confidence >= det.confidence => {}
                _ => {
                    best.insert(det.name.clone(), det);
                }
            }
        }

        // Deterministic order: cue first, then by number
        let mut detections: Vec<Detection> = best.into_values().collect();
        detections.sort_by_key(|d| d.ball_id());

        DetectionFrame { frame_index: self.frame_index, timestamp: self.timestamp, detections }
    }
}

/// Greedy non-maximum suppression on circle IoU
pub fn merge_overlapping(mut detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    if detections.len() <= 1 {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let circle = det.circle();
        if kept.iter().all(|k| circle_iou(&k.circle(), &circle) < iou_threshold) {
            kept.push(det);
        }
    }
    kept
}
