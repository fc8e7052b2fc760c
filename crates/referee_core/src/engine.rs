//! Frame Engine
//!
//! Per-frame orchestration: one detector frame in, referee decisions out.
//! The engine owns one of each component and is the only thing that mutates
//! them.
//!
//! ## Evaluation Order (fixed)
//!
//! | Step | Component | Effect |
//! |------|-----------|--------|
//! | 1 | frame order check | out-of-order frames rejected, nothing touched |
//! | 2 | normaliser | confidence floor, overlap merge, best per label |
//! | 3 | motion detector | moving balls, table at rest |
//! | 4 | collision detector | first contact → `record_collision` |
//! | 5 | presence tracker | reappeared / missing / confirmed pot (deferred) |
//! | 6 | deferred pots | applied once the table rests and no contact is pending |
//! | 7 | table outline | rail contacts, balls off the table |
//! | 8 | cue scratch poll | cue missing long enough → scratch foul |
//! | 9 | movement timeout | shot armed by motion after rest, then polled |
//! | 10 | lowest ball | recomputed from tracker and rule state |
//! | 11 | sink / archive | events out, finished match handed off |
//!
//! Contacts are applied before pots, and a confirmed pot waits while any
//! contact is still in its look-ahead window, so a ball struck and pocketed
//! is scored rather than treated as a pre-contact pot. Pots are only applied
//! while the table is at rest: a ball hidden behind moving balls is not
//! called pocketed mid-shot.

use std::sync::Arc;

use crate::collision::{CollisionDetector, CollisionEvent};
use crate::config::RefereeConfig;
use crate::error::{ConfigError, EngineError, RefereeError};
use crate::models::{BallId, DetectionFrame, RefereeEvent};
use crate::motion::{MotionDetector, MotionReading};
use crate::presence::{BallPresenceTracker, PresenceUpdate};
use crate::referee::{GameStateView, MatchPhase, Referee};
use crate::sink::{EventSink, MatchArchive};

/// What one frame did
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    pub collisions: Vec<CollisionEvent>,
    pub presence: PresenceUpdate,
    pub motion: MotionReading,
    /// Everything emitted to the sink for this frame
    pub events: Vec<RefereeEvent>,
    /// Rule-state inconsistencies met while processing this frame
    pub faults: Vec<RefereeError>,
}

pub struct RefereeEngine {
    config: RefereeConfig,
    tracker: BallPresenceTracker,
    collisions: CollisionDetector,
    motion: MotionDetector,
    referee: Referee,
    sink: Arc<dyn EventSink>,
    archive: Arc<dyn MatchArchive>,
    last_frame: Option<u64>,
    /// Confirmed pots not yet handed to the referee
    deferred_pots: Vec<BallId>,
    /// Take the match start time from the next processed frame
    anchor_pending: bool,
}

impl RefereeEngine {
    pub fn new(
        config: RefereeConfig,
        sink: Arc<dyn EventSink>,
        archive: Arc<dyn MatchArchive>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tracker: BallPresenceTracker::new(&config.presence)?,
            collisions: CollisionDetector::new(config.collision.clone())?,
            motion: MotionDetector::new(config.motion.clone())?,
            referee: Referee::new(config.rules.clone())?,
            config,
            sink,
            archive,
            last_frame: None,
            deferred_pots: Vec::new(),
            anchor_pending: false,
        })
    }

    pub fn config(&self) -> &RefereeConfig {
        &self.config
    }

    pub fn referee(&self) -> &Referee {
        &self.referee
    }

    pub fn tracker(&self) -> &BallPresenceTracker {
        &self.tracker
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Confirmed pots waiting for the table to rest
    pub fn deferred_pots(&self) -> &[BallId] {
        &self.deferred_pots
    }

    pub fn game_state(&self) -> GameStateView {
        self.referee.game_state()
    }

    // =========================================================================
    // Match control
    // =========================================================================

    pub fn start(
        &mut self,
        player1: &str,
        player2: &str,
        starting_player: usize,
    ) -> Result<Vec<RefereeEvent>, EngineError> {
        let new_rack = self.referee.phase() == MatchPhase::Ended;
        let events = self.referee.start(player1, player2, starting_player)?;
        if new_rack {
            // The previous rack's pots say nothing about the new one
            self.reset_perception();
        }
        self.deferred_pots.clear();
        self.anchor_pending = true;
        self.publish(&events);
        Ok(events)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        Ok(self.referee.pause()?)
    }

    /// Frames skipped while paused break pair continuity, so the collision and
    /// motion detectors start over.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.referee.resume()?;
        self.collisions.reset();
        self.motion.reset();
        Ok(())
    }

    /// Discard the match and all perception state
    pub fn reset(&mut self) {
        self.referee.reset();
        self.reset_perception();
        self.deferred_pots.clear();
        self.anchor_pending = false;
        self.last_frame = None;
    }

    fn reset_perception(&mut self) {
        self.tracker.reset();
        self.collisions.reset();
        self.motion.reset();
    }

    // =========================================================================
    // Frame processing
    // =========================================================================

    /// Seconds for a frame: its own timestamp, else derived from the index
    pub fn frame_time(&self, frame: &DetectionFrame) -> f64 {
        frame
            .timestamp
            .unwrap_or(frame.frame_index as f64 / self.config.detection.frames_per_second)
    }

    /// Process one frame. Indices must strictly increase; a violation is
    /// rejected before anything is changed.
    pub fn process_frame(&mut self, frame: &DetectionFrame) -> Result<FrameReport, EngineError> {
        if let Some(last) = self.last_frame {
            if frame.frame_index <= last {
                return Err(EngineError::OutOfOrderFrame { got: frame.frame_index, last });
            }
        }
        self.last_frame = Some(frame.frame_index);

        let timestamp = self.frame_time(frame);
        let mut report =
            FrameReport { frame_index: frame.frame_index, timestamp, ..FrameReport::default() };

        if self.referee.phase() == MatchPhase::Paused {
            log::debug!("frame {}: paused, skipped", frame.frame_index);
            return Ok(report);
        }

        let detection = &self.config.detection;
        let frame = frame.normalized(detection.confidence_floor, detection.merge_iou_threshold);
        self.referee.set_clock(frame.frame_index, timestamp);
        if self.anchor_pending {
            self.referee.anchor_start_time(timestamp);
            self.anchor_pending = false;
        }

        let mut events = Vec::new();
        report.motion = self.motion.update(&frame, timestamp);

        report.collisions = self.collisions.push(frame.clone());
        self.apply_collisions(&report.collisions, &mut events);

        report.presence = self.tracker.update_from_frame(&frame);
        for reappearance in &report.presence.reappeared {
            self.deferred_pots.retain(|b| *b != reappearance.ball);
            events.extend(self.referee.note_ball_reappeared(reappearance));
        }
        for ball in &report.presence.newly_missing {
            events.extend(self.referee.note_ball_missing(*ball));
        }
        self.deferred_pots.extend(report.presence.newly_confirmed_potted.iter().copied());
        if report.motion.at_rest && self.collisions.pending_count() == 0 {
            self.apply_deferred_pots(&mut events);
        }

        self.check_table(&frame, &report.motion, &mut events);

        events.extend(self.referee.check_cue_scratch(frame.contains(BallId::Cue)));

        self.referee.note_motion(report.motion.table_moving, report.motion.at_rest);
        if let Some(elapsed) = self.motion.elapsed_since_motion(timestamp) {
            events.extend(self.referee.check_movement_timeout(elapsed));
        }

        self.referee.update_lowest_ball(&self.tracker);

        self.publish(&events);
        report.events = events;
        report.faults = self.referee.take_faults();
        for fault in &report.faults {
            log::error!("frame {}: {}", report.frame_index, fault);
        }
        Ok(report)
    }

    /// End of input: resolve contacts still waiting on the look-ahead window
    pub fn finish(&mut self) -> Vec<RefereeEvent> {
        let collisions = self.collisions.flush();
        let mut events = Vec::new();
        self.apply_collisions(&collisions, &mut events);
        self.apply_deferred_pots(&mut events);
        self.publish(&events);
        events
    }

    fn apply_deferred_pots(&mut self, events: &mut Vec<RefereeEvent>) {
        for ball in std::mem::take(&mut self.deferred_pots) {
            events.extend(self.referee.record_pot(&ball.label()));
        }
    }

    /// Rail contacts and off-table balls, when the table outline is known
    fn check_table(
        &mut self,
        frame: &DetectionFrame,
        motion: &MotionReading,
        events: &mut Vec<RefereeEvent>,
    ) {
        let Some(bounds) = self.config.table.bounds else { return };
        let margin = self.config.table.rail_margin;
        for det in &frame.detections {
            let Some(ball) = det.ball_id() else { continue };
            if bounds.is_outside(det.x, det.y, margin) {
                events.extend(self.referee.note_ball_off_table(ball));
            } else if motion.moving_balls.contains(&ball)
                && bounds.rail_near(det.x, det.y, margin).is_some()
            {
                self.referee.note_rail_contact(ball);
            }
        }
    }

    fn apply_collisions(&mut self, collisions: &[CollisionEvent], events: &mut Vec<RefereeEvent>) {
        let mut ordered: Vec<&CollisionEvent> = collisions.iter().collect();
        ordered.sort_by_key(|c| (c.frame_index, c.ball));
        for collision in ordered {
            events.extend(self.referee.record_collision(&collision.ball.label()));
        }
    }

    fn publish(&mut self, events: &[RefereeEvent]) {
        for event in events {
            self.sink.emit(event);
        }
        if let Some(summary) = self.referee.take_finished_match() {
            self.archive.store(summary);
        }
    }
}
