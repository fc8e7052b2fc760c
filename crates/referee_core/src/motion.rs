//! Table motion detection
//!
//! A ball is moving when its centre travels more than
//! `movement_threshold_px` between consecutive frames. The table is at rest
//! after `stable_frames` consecutive frames with nothing moving. The referee
//! only needs the time since the last motion to poll its movement timeout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::MotionConfig;
use crate::error::ConfigError;
use crate::geometry::point_distance;
use crate::models::{BallId, DetectionFrame};

/// Result of one motion update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionReading {
    pub moving_balls: Vec<BallId>,
    /// Any ball moved this frame
    pub table_moving: bool,
    /// `stable_frames` still frames in a row
    pub at_rest: bool,
}

#[derive(Debug, Clone)]
pub struct MotionDetector {
    config: MotionConfig,
    previous: HashMap<BallId, (f64, f64)>,
    still_frames: u32,
    last_motion_at: Option<f64>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, previous: HashMap::new(), still_frames: 0, last_motion_at: None })
    }

    /// Compare against the previous frame. `now` is the frame time in seconds.
    ///
    /// Balls seen in only one of the two frames are not counted as moving.
    pub fn update(&mut self, frame: &DetectionFrame, now: f64) -> MotionReading {
        let threshold = self.config.movement_threshold_px;
        let mut current = HashMap::with_capacity(frame.detections.len());
        let mut moving_balls = Vec::new();

        for det in &frame.detections {
            let Some(ball) = det.ball_id() else { continue };
            let position = (det.x, det.y);
            if let Some(prev) = self.previous.get(&ball) {
                if point_distance(*prev, position) > threshold {
                    moving_balls.push(ball);
                }
            }
            current.insert(ball, position);
        }
        self.previous = current;

        let table_moving = !moving_balls.is_empty();
        if table_moving {
            self.still_frames = 0;
            self.last_motion_at = Some(now);
        } else {
            self.still_frames = self.still_frames.saturating_add(1);
        }

        MotionReading { moving_balls, table_moving, at_rest: self.is_at_rest() }
    }

    pub fn is_at_rest(&self) -> bool {
        self.still_frames >= self.config.stable_frames
    }

    /// Seconds since the last frame with motion, `None` before any motion
    pub fn elapsed_since_motion(&self, now: f64) -> Option<f64> {
        self.last_motion_at.map(|t| (now - t).max(0.0))
    }

    pub fn reset(&mut self) {
        self.previous.clear();
        self.still_frames = 0;
        self.last_motion_at = None;
    }
}
