//! Collision Detector
//!
//! Detects cue-ball / object-ball contacts over consecutive frame pairs
//! `(N-1, N)`. Every object ball present at `N-1` must pass three gates:
//!
//! | Gate | Test |
//! |------|------|
//! | Proximity | `min(d(cue[N-1], ball[N-1]), d(cue[N], ball[N])) <= proximity_cutoff` |
//! | Contact | `d(cue[N], ball[N-1]) <= r(cue[N]) + r(ball[N-1]) + contact_margin` |
//! | Movement | ball displaced more than `move_ratio * r` between `N-1` and `N` |
//!
//! The contact gate tests the cue's *current* position against the ball's
//! *prior* position, which catches the instant of impact at low frame rates.
//!
//! When the struck ball vanishes at `N` the movement gate cannot be decided
//! yet. The contact is parked and resolved once the ball reappears (compared
//! with its pre-vanish position) or once `lookahead_frames` frames pass
//! without it, in which case movement is assumed.
//!
//! Contacts with the same ball at most `merge_gap` frames apart collapse into
//! the earliest one, so one physical hit yields one event.
//!
//! ## Usage
//!
//! ```rust
//! use referee_core::collision::CollisionDetector;
//! use referee_core::config::CollisionConfig;
//!
//! let mut detector = CollisionDetector::new(CollisionConfig::default()).unwrap();
//! # let frames: Vec<referee_core::models::DetectionFrame> = Vec::new();
//! for frame in frames {
//!     for hit in detector.push(frame) {
//!         println!("cue hit {} at frame {}", hit.ball, hit.frame_index);
//!     }
//! }
//! let late_hits = detector.flush();
//! # assert!(late_hits.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::CollisionConfig;
use crate::error::ConfigError;
use crate::geometry::{distance, Circle};
use crate::models::{BallId, DetectionFrame};

/// One confirmed cue-ball contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    /// `N` when the struck ball is still visible there, else `N-1`
    pub frame_index: u64,
    /// Cue ball at `frame_index`
    pub cue: Circle,
    pub ball: BallId,
    /// Struck ball at `frame_index`
    pub ball_circle: Circle,
}

/// Contact whose struck ball vanished; waiting for the look-ahead to decide
#[derive(Debug, Clone)]
struct PendingContact {
    ball: BallId,
    /// Last frame the ball was seen (`N-1`)
    frame_index: u64,
    cue: Circle,
    ball_circle: Circle,
    /// Frames examined after the vanish frame
    frames_checked: u32,
}

impl PendingContact {
    fn into_event(self) -> CollisionEvent {
        CollisionEvent {
            frame_index: self.frame_index,
            cue: self.cue,
            ball: self.ball,
            ball_circle: self.ball_circle,
        }
    }
}

/// Streaming collision detector
#[derive(Debug, Clone)]
pub struct CollisionDetector {
    config: CollisionConfig,
    /// Frame `N-1` of the next pair
    previous: Option<DetectionFrame>,
    /// Frames waiting for the next `check_interval` batch
    queued: Vec<DetectionFrame>,
    pending: Vec<PendingContact>,
    /// Most recent contact frame per ball, for merging bursts
    last_contact: HashMap<BallId, u64>,
    last_pushed: Option<u64>,
}

impl CollisionDetector {
    pub fn new(config: CollisionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            previous: None,
            queued: Vec::new(),
            pending: Vec::new(),
            last_contact: HashMap::new(),
            last_pushed: None,
        })
    }

    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Contacts still waiting on the look-ahead window
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Feed the next frame. Returns contacts decided by this push.
    ///
    /// Frames are evaluated in batches of `check_interval`; frames whose index
    /// does not increase are dropped.
    pub fn push(&mut self, frame: DetectionFrame) -> Vec<CollisionEvent> {
        if let Some(last) = self.last_pushed {
            if frame.frame_index <= last {
                log::warn!(
                    "collision detector: dropping frame {} (last pushed {})",
                    frame.frame_index,
                    last
                );
                return Vec::new();
            }
        }
        self.last_pushed = Some(frame.frame_index);
        self.queued.push(frame);

        if self.queued.len() < self.config.check_interval as usize {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.drain_queue(&mut out);
        out
    }

    /// End of data: evaluate queued frames and resolve every parked contact
    /// as moved.
    pub fn flush(&mut self) -> Vec<CollisionEvent> {
        let mut out = Vec::new();
        self.drain_queue(&mut out);

        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|p| (p.frame_index, p.ball));
        for contact in pending {
            self.accept(contact.into_event(), &mut out);
        }
        out
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.queued.clear();
        self.pending.clear();
        self.last_contact.clear();
        self.last_pushed = None;
    }

    fn drain_queue(&mut self, out: &mut Vec<CollisionEvent>) {
        for frame in std::mem::take(&mut self.queued) {
            self.step(frame, out);
        }
    }

    fn step(&mut self, frame: DetectionFrame, out: &mut Vec<CollisionEvent>) {
        self.resolve_pending(&frame, out);
        if let Some(prev) = self.previous.take() {
            self.evaluate_pair(&prev, &frame, out);
        }
        self.previous = Some(frame);
    }

    fn resolve_pending(&mut self, frame: &DetectionFrame, out: &mut Vec<CollisionEvent>) {
        if self.pending.is_empty() {
            return;
        }
        let ratio = self.config.move_ratio;
        let lookahead = self.config.lookahead_frames;
        let mut decided = Vec::new();

        self.pending.retain_mut(|contact| match frame.circle_of(contact.ball) {
            Some(now) => {
                // Reappeared: compare against the pre-vanish footprint
                if distance(&now, &contact.ball_circle) > contact.ball_circle.r * ratio {
                    decided.push(contact.clone());
                } else {
                    log::debug!(
                        "frame {}: {} reappeared in place, contact at {} discarded",
                        frame.frame_index,
                        contact.ball,
                        contact.frame_index
                    );
                }
                false
            }
            None => {
                contact.frames_checked += 1;
                if contact.frames_checked >= lookahead {
                    decided.push(contact.clone());
                    false
                } else {
                    true
                }
            }
        });

        for contact in decided {
            self.accept(contact.into_event(), out);
        }
    }

    fn evaluate_pair(
        &mut self,
        prev: &DetectionFrame,
        curr: &DetectionFrame,
        out: &mut Vec<CollisionEvent>,
    ) {
        let (Some(cue_prev), Some(cue_now)) = (prev.circle_of(BallId::Cue), curr.circle_of(BallId::Cue))
        else {
            return;
        };

        for det in &prev.detections {
            let Some(ball) = det.ball_id() else { continue };
            if ball.is_cue() {
                continue;
            }
            let before = det.circle();
            let after = curr.circle_of(ball);

            let dist_prev = distance(&cue_prev, &before);
            let closest = match after {
                Some(now) => dist_prev.min(distance(&cue_now, &now)),
                None => dist_prev,
            };
            if closest > self.config.proximity_cutoff {
                continue;
            }

            if distance(&cue_now, &before) > cue_now.r + before.r + self.config.contact_margin {
                continue;
            }

            match after {
                Some(now) => {
                    if distance(&now, &before) > now.r * self.config.move_ratio {
                        let event = CollisionEvent {
                            frame_index: curr.frame_index,
                            cue: cue_now,
                            ball,
                            ball_circle: now,
                        };
                        self.accept(event, out);
                    }
                }
                None => {
                    let contact = PendingContact {
                        ball,
                        frame_index: prev.frame_index,
                        cue: cue_prev,
                        ball_circle: before,
                        frames_checked: 0,
                    };
                    if self.config.lookahead_frames == 0 {
                        self.accept(contact.into_event(), out);
                    } else {
                        log::debug!(
                            "frame {}: {} vanished after contact, awaiting look-ahead",
                            curr.frame_index,
                            ball
                        );
                        self.pending.push(contact);
                    }
                }
            }
        }
    }

    /// Merge-gap filter; exact duplicates fall out as a gap of zero.
    fn accept(&mut self, event: CollisionEvent, out: &mut Vec<CollisionEvent>) {
        match self.last_contact.get(&event.ball).copied() {
            Some(last) if last.abs_diff(event.frame_index) <= self.config.merge_gap => {
                self.last_contact.insert(event.ball, last.max(event.frame_index));
            }
            _ => {
                log::debug!("frame {}: collision with {}", event.frame_index, event.ball);
                self.last_contact.insert(event.ball, event.frame_index);
                out.push(event);
            }
        }
    }
}

/// Batch form: push every frame, then flush. Sorted by `(frame, ball)`.
pub fn detect_collisions(
    frames: &[DetectionFrame],
    config: &CollisionConfig,
) -> Result<Vec<CollisionEvent>, ConfigError> {
    let mut detector = CollisionDetector::new(config.clone())?;
    let mut events = Vec::new();
    for frame in frames {
        events.extend(detector.push(frame.clone()));
    }
    events.extend(detector.flush());
    events.sort_by_key(|e| (e.frame_index, e.ball));
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Detection;

    const R: f64 = 10.0;

    fn frame(index: u64, cue: Option<f64>, ball: Option<f64>) -> DetectionFrame {
        let mut detections = Vec::new();
        if let Some(x) = cue {
            detections.push(Detection::new("cueball", x, 100.0, R, 0.9));
        }
        if let Some(x) = ball {
            detections.push(Detection::new("bi3", x, 100.0, R, 0.9));
        }
        DetectionFrame::new(index, detections)
    }

    fn run(frames: &[DetectionFrame]) -> Vec<CollisionEvent> {
        detect_collisions(frames, &CollisionConfig::default()).unwrap()
    }

    #[test]
    fn test_contact_recorded_at_current_frame() {
        // Cue arrives at the ball's old spot; ball shoots off
        let frames = vec![frame(0, Some(60.0), Some(100.0)), frame(1, Some(82.0), Some(115.0))];
        let events = run(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 1);
        assert_eq!(events[0].ball, BallId::Object(3));
        assert_eq!(events[0].ball_circle.x, 115.0);
    }

    #[test]
    fn test_stationary_ball_is_not_a_contact() {
        let frames = vec![frame(0, Some(60.0), Some(100.0)), frame(1, Some(82.0), Some(101.0))];
        assert!(run(&frames).is_empty());
    }

    #[test]
    fn test_distant_cue_fails_contact_gate() {
        let frames = vec![frame(0, Some(0.0), Some(100.0)), frame(1, Some(30.0), Some(120.0))];
        assert!(run(&frames).is_empty());
    }

    #[test]
    fn test_missing_cue_skips_pair() {
        let frames = vec![frame(0, None, Some(100.0)), frame(1, Some(82.0), Some(120.0))];
        assert!(run(&frames).is_empty());
    }

    #[test]
    fn test_vanished_ball_never_returning_counts_at_previous_frame() {
        let frames = vec![
            frame(0, Some(60.0), Some(100.0)),
            frame(1, Some(82.0), None),
            frame(2, Some(84.0), None),
        ];
        let events = run(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 0);
        assert_eq!(events[0].ball_circle.x, 100.0);
        assert_eq!(events[0].cue.x, 60.0);
    }

    #[test]
    fn test_vanished_ball_reappearing_in_place_is_discarded() {
        let mut frames = vec![frame(0, Some(60.0), Some(100.0)), frame(1, Some(82.0), None)];
        frames.push(frame(2, Some(82.0), None));
        frames.push(frame(3, Some(82.0), Some(101.0)));
        assert!(run(&frames).is_empty());
    }

    #[test]
    fn test_vanished_ball_reappearing_displaced_counts() {
        let mut detector = CollisionDetector::new(CollisionConfig::default()).unwrap();
        assert!(detector.push(frame(0, Some(60.0), Some(100.0))).is_empty());
        assert!(detector.push(frame(1, Some(82.0), None)).is_empty());
        assert_eq!(detector.pending_count(), 1);

        let events = detector.push(frame(2, Some(82.0), Some(160.0)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 0);
        assert_eq!(detector.pending_count(), 0);
    }

    #[test]
    fn test_lookahead_window_exhaustion_assumes_movement() {
        let mut detector = CollisionDetector::new(CollisionConfig::default()).unwrap();
        detector.push(frame(0, Some(60.0), Some(100.0)));
        detector.push(frame(1, Some(82.0), None));
        // Frames 2..=9 are eight look-ahead frames: still undecided
        for index in 2..=9 {
            assert!(detector.push(frame(index, Some(82.0), None)).is_empty());
        }
        // Ninth look-ahead frame closes the window
        let events = detector.push(frame(10, Some(82.0), None));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 0);
    }

    #[test]
    fn test_burst_of_contacts_merges_to_earliest() {
        // Cue follows the ball for five frames, every pair passes all gates
        let frames: Vec<DetectionFrame> = (0..=5)
            .map(|k| {
                let ball = 100.0 + 5.0 * k as f64;
                frame(k, Some(ball - 20.0), Some(ball))
            })
            .collect();
        let events = run(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 1);
    }

    #[test]
    fn test_separate_hits_beyond_gap_are_kept() {
        let frames = vec![
            frame(0, Some(60.0), Some(100.0)),
            frame(1, Some(82.0), Some(115.0)),
            frame(2, Some(40.0), Some(115.0)),
            frame(3, Some(40.0), Some(115.0)),
            frame(4, Some(40.0), Some(115.0)),
            frame(5, Some(97.0), Some(130.0)),
        ];
        let events = run(&frames);
        assert_eq!(events.iter().map(|e| e.frame_index).collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn test_check_interval_batches_evaluation() {
        let config = CollisionConfig { check_interval: 3, ..CollisionConfig::default() };
        let mut detector = CollisionDetector::new(config).unwrap();
        assert!(detector.push(frame(0, Some(60.0), Some(100.0))).is_empty());
        assert!(detector.push(frame(1, Some(82.0), Some(115.0))).is_empty());
        let events = detector.push(frame(2, Some(82.0), Some(130.0)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frame_index, 1);
    }

    #[test]
    fn test_out_of_order_frame_dropped() {
        let mut detector = CollisionDetector::new(CollisionConfig::default()).unwrap();
        detector.push(frame(5, Some(60.0), Some(100.0)));
        assert!(detector.push(frame(5, Some(82.0), Some(115.0))).is_empty());
        assert!(detector.push(frame(3, Some(82.0), Some(115.0))).is_empty());
        assert_eq!(detector.push(frame(6, Some(82.0), Some(115.0))).len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CollisionConfig { check_interval: 0, ..CollisionConfig::default() };
        assert!(CollisionDetector::new(config).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn frames_strategy() -> impl Strategy<Value = Vec<DetectionFrame>> {
            prop::collection::vec(
                (prop::option::weighted(0.9, 40.0f64..160.0), prop::option::weighted(0.8, 80.0f64..140.0)),
                2..30,
            )
            .prop_map(|cols| {
                cols.into_iter()
                    .enumerate()
                    .map(|(i, (cue, ball))| frame(i as u64, cue, ball))
                    .collect()
            })
        }

        proptest! {
            /// Property: batching by check_interval never changes the result
            #[test]
            fn prop_streaming_matches_batch(frames in frames_strategy(), interval in 1u32..6) {
                let expected = detect_collisions(&frames, &CollisionConfig::default()).unwrap();

                let config = CollisionConfig { check_interval: interval, ..CollisionConfig::default() };
                let mut detector = CollisionDetector::new(config).unwrap();
                let mut streamed = Vec::new();
                for f in frames {
                    streamed.extend(detector.push(f));
                }
                streamed.extend(detector.flush());
                streamed.sort_by_key(|e| (e.frame_index, e.ball));

                prop_assert_eq!(streamed, expected);
            }

            /// Property: no two events for one ball within the merge gap
            #[test]
            fn prop_no_events_within_merge_gap(frames in frames_strategy()) {
                let events = detect_collisions(&frames, &CollisionConfig::default()).unwrap();
                for pair in events.windows(2) {
                    prop_assert!(pair[1].frame_index - pair[0].frame_index > 2);
                }
            }
        }
    }
}
