//! Ball-Presence Tracker
//!
//! Turns a noisy per-frame "which balls did the detector see" signal into a
//! per-ball lifecycle with two-phase pot confirmation.
//!
//! ```text
//!              absent (seen before)             absent x CONFIRM_THRESHOLD
//!   OnTable ─────────────────────────► Missing(n) ───────────────────────► Potted
//!      ▲                                   │                                 │
//!      └──────────── detected ─────────────┴─────────── detected ────────────┘
//! ```
//!
//! `Missing` is the optimistic "looks potted" signal, available after a single
//! dropped frame. `Potted` requires sustained absence and is the only signal
//! the rules react to. A ball that has never been observed is never marked
//! missing, so balls that are not yet in frame cannot be falsely potted.
//!
//! The tracker knows nothing about match rules.

use serde::{Deserialize, Serialize};

use crate::config::PresenceConfig;
use crate::error::ConfigError;
use crate::models::{BallId, DetectionFrame, NINE_BALL};

/// Lifecycle state of one numbered ball
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "missing_frames")]
pub enum PresenceState {
    OnTable,
    /// Consecutive frames the ball has been absent
    Missing(u32),
    Potted,
}

/// Tracked lifecycle of one numbered ball
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallRecord {
    pub ball: BallId,
    pub state: PresenceState,
    /// `None` until the ball has been detected at least once
    pub last_seen_frame: Option<u64>,
    pub last_position: Option<(f64, f64)>,
}

impl BallRecord {
    fn new(ball: BallId) -> Self {
        Self { ball, state: PresenceState::OnTable, last_seen_frame: None, last_position: None }
    }

    pub fn has_been_seen(&self) -> bool {
        self.last_seen_frame.is_some()
    }
}

/// A ball that came back after being missing or potted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reappearance {
    pub ball: BallId,
    /// Consecutive frames it had been absent
    pub missing_frames: u32,
    /// It had already been confirmed potted (a false pot is being corrected)
    pub was_potted: bool,
}

/// Transitions produced by one `update`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub newly_missing: Vec<BallId>,
    pub newly_confirmed_potted: Vec<BallId>,
    pub reappeared: Vec<Reappearance>,
}

impl PresenceUpdate {
    pub fn is_empty(&self) -> bool {
        self.newly_missing.is_empty()
            && self.newly_confirmed_potted.is_empty()
            && self.reappeared.is_empty()
    }
}

/// Per-ball presence state machine for balls 1..=9
#[derive(Debug, Clone)]
pub struct BallPresenceTracker {
    confirm_threshold: u32,
    /// Index `n - 1` holds ball `n`
    records: Vec<BallRecord>,
    /// Frames missing when each ball was confirmed potted
    potted_after: [u32; NINE_BALL as usize],
}

impl BallPresenceTracker {
    pub fn new(config: &PresenceConfig) -> Result<Self, ConfigError> {
        if config.confirm_threshold == 0 {
            return Err(ConfigError::TooSmall {
                field: "presence.confirm_threshold",
                min: 1,
                value: 0,
            });
        }
        Ok(Self {
            confirm_threshold: config.confirm_threshold,
            records: BallId::objects().map(BallRecord::new).collect(),
            potted_after: [0; NINE_BALL as usize],
        })
    }

    pub fn confirm_threshold(&self) -> u32 {
        self.confirm_threshold
    }

    /// Advance every numbered ball by one frame.
    ///
    /// `detected` lists the balls seen this frame; the cue ball and duplicates
    /// are ignored.
    pub fn update(&mut self, frame_index: u64, detected: &[BallId]) -> PresenceUpdate {
        self.advance(frame_index, |ball| detected.contains(&ball).then_some(None))
    }

    /// Same as `update`, also recording last known positions.
    pub fn update_from_frame(&mut self, frame: &DetectionFrame) -> PresenceUpdate {
        self.advance(frame.frame_index, |ball| frame.get(ball).map(|d| Some((d.x, d.y))))
    }

    /// `seen(ball)` is `None` when absent, `Some(position)` when detected
    fn advance<F>(&mut self, frame_index: u64, seen: F) -> PresenceUpdate
    where
        F: Fn(BallId) -> Option<Option<(f64, f64)>>,
    {
        let mut update = PresenceUpdate::default();
        let threshold = self.confirm_threshold;

        for (slot, record) in self.records.iter_mut().enumerate() {
            match seen(record.ball) {
                Some(position) => {
                    let previous = record.state;
                    record.state = PresenceState::OnTable;
                    record.last_seen_frame = Some(frame_index);
                    if position.is_some() {
                        record.last_position = position;
                    }
                    match previous {
                        PresenceState::OnTable => {}
                        PresenceState::Missing(count) => {
                            log::debug!(
                                "frame {}: {} reappeared after {} missing frames",
                                frame_index,
                                record.ball,
                                count
                            );
                            update.reappeared.push(Reappearance {
                                ball: record.ball,
                                missing_frames: count,
                                was_potted: false,
                            });
                        }
                        PresenceState::Potted => {
                            log::info!(
                                "frame {}: {} reappeared after confirmed pot, correcting",
                                frame_index,
                                record.ball
                            );
                            update.reappeared.push(Reappearance {
                                ball: record.ball,
                                missing_frames: self.potted_after[slot],
                                was_potted: true,
                            });
                        }
                    }
                }
                None => match record.state {
                    PresenceState::OnTable => {
                        if !record.has_been_seen() {
                            continue;
                        }
                        update.newly_missing.push(record.ball);
                        if threshold <= 1 {
                            record.state = PresenceState::Potted;
                            self.potted_after[slot] = 1;
                            update.newly_confirmed_potted.push(record.ball);
                        } else {
                            record.state = PresenceState::Missing(1);
                        }
                    }
                    PresenceState::Missing(count) => {
                        let count = count + 1;
                        if count >= threshold {
                            log::debug!(
                                "frame {}: {} confirmed potted after {} missing frames",
                                frame_index,
                                record.ball,
                                count
                            );
                            record.state = PresenceState::Potted;
                            self.potted_after[slot] = count;
                            update.newly_confirmed_potted.push(record.ball);
                        } else {
                            record.state = PresenceState::Missing(count);
                        }
                    }
                    PresenceState::Potted => {
                        self.potted_after[slot] = self.potted_after[slot].saturating_add(1);
                    }
                },
            }
        }

        update
    }

    pub fn record(&self, ball: BallId) -> Option<&BallRecord> {
        let n = ball.number()?;
        self.records.get(n as usize - 1)
    }

    pub fn state(&self, ball: BallId) -> Option<PresenceState> {
        self.record(ball).map(|r| r.state)
    }

    /// Exactly `OnTable`: missing and potted balls are excluded
    pub fn is_on_table(&self, ball: BallId) -> bool {
        self.state(ball) == Some(PresenceState::OnTable)
    }

    pub fn records(&self) -> &[BallRecord] {
        &self.records
    }

    pub fn reset(&mut self) {
        self.records = BallId::objects().map(BallRecord::new).collect();
        self.potted_after = [0; NINE_BALL as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32) -> BallPresenceTracker {
        BallPresenceTracker::new(&PresenceConfig { confirm_threshold: threshold }).unwrap()
    }

    const B3: BallId = BallId::Object(3);

    #[test]
    fn test_never_seen_ball_is_never_missing() {
        let mut t = tracker(10);
        for frame in 1..=30 {
            let update = t.update(frame, &[BallId::Object(1)]);
            assert!(!update.newly_missing.contains(&B3));
            assert!(!update.newly_confirmed_potted.contains(&B3));
        }
        assert_eq!(t.state(B3), Some(PresenceState::OnTable));
        assert_eq!(t.record(B3).unwrap().last_seen_frame, None);
    }

    #[test]
    fn test_first_absence_reports_missing() {
        let mut t = tracker(10);
        t.update(1, &[B3]);
        let update = t.update(2, &[]);
        assert_eq!(update.newly_missing, vec![B3]);
        assert_eq!(t.state(B3), Some(PresenceState::Missing(1)));
    }

    #[test]
    fn test_confirmation_is_threshold_exact() {
        let mut t = tracker(10);
        t.update(0, &[B3]);

        for frame in 1..10 {
            let update = t.update(frame, &[]);
            assert!(update.newly_confirmed_potted.is_empty(), "frame {}", frame);
        }
        assert_eq!(t.state(B3), Some(PresenceState::Missing(9)));

        let update = t.update(10, &[]);
        assert_eq!(update.newly_confirmed_potted, vec![B3]);
        assert_eq!(t.state(B3), Some(PresenceState::Potted));

        // Confirmation is reported once
        assert!(t.update(11, &[]).newly_confirmed_potted.is_empty());
    }

    #[test]
    fn test_absent_nine_frames_then_redetected() {
        let mut t = tracker(10);
        t.update(0, &[B3]);
        for frame in 1..=9 {
            assert!(t.update(frame, &[]).newly_confirmed_potted.is_empty());
        }
        let update = t.update(10, &[B3]);
        assert_eq!(
            update.reappeared,
            vec![Reappearance { ball: B3, missing_frames: 9, was_potted: false }]
        );
        assert_eq!(t.state(B3), Some(PresenceState::OnTable));
        assert_eq!(t.record(B3).unwrap().last_seen_frame, Some(10));
    }

    #[test]
    fn test_reappearance_after_confirmed_pot() {
        let mut t = tracker(3);
        t.update(0, &[B3]);
        t.update(1, &[]);
        t.update(2, &[]);
        assert!(t.update(3, &[]).newly_confirmed_potted.contains(&B3));
        t.update(4, &[]);

        let update = t.update(5, &[B3]);
        assert_eq!(
            update.reappeared,
            vec![Reappearance { ball: B3, missing_frames: 4, was_potted: true }]
        );
        assert!(t.is_on_table(B3));
    }

    #[test]
    fn test_threshold_of_one_confirms_immediately() {
        let mut t = tracker(1);
        t.update(0, &[B3]);
        let update = t.update(1, &[]);
        assert_eq!(update.newly_missing, vec![B3]);
        assert_eq!(update.newly_confirmed_potted, vec![B3]);
    }

    #[test]
    fn test_update_from_frame_records_position() {
        use crate::models::{Detection, DetectionFrame};
        let mut t = tracker(10);
        let frame = DetectionFrame::new(4, vec![Detection::new("bi3", 120.0, 80.0, 11.0, 0.9)]);
        t.update_from_frame(&frame);
        let record = t.record(B3).unwrap();
        assert_eq!(record.last_position, Some((120.0, 80.0)));
        assert_eq!(record.last_seen_frame, Some(4));
        assert!(t.record(BallId::Cue).is_none());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert!(BallPresenceTracker::new(&PresenceConfig { confirm_threshold: 0 }).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: absent k frames after being seen → Potted iff k ≥ threshold;
            /// redetection always yields OnTable with the counter reset.
            #[test]
            fn prop_confirmation_threshold(threshold in 1u32..20, absent in 0u32..40) {
                let mut t = tracker(threshold);
                t.update(0, &[B3]);
                for frame in 1..=absent as u64 {
                    t.update(frame, &[]);
                }
                let expected = if absent == 0 {
                    PresenceState::OnTable
                } else if absent >= threshold {
                    PresenceState::Potted
                } else {
                    PresenceState::Missing(absent)
                };
                prop_assert_eq!(t.state(B3), Some(expected));

                t.update(absent as u64 + 1, &[B3]);
                prop_assert_eq!(t.state(B3), Some(PresenceState::OnTable));
                t.update(absent as u64 + 2, &[]);
                prop_assert_eq!(t.state(B3), Some(if threshold == 1 {
                    PresenceState::Potted
                } else {
                    PresenceState::Missing(1)
                }));
            }
        }
    }
}
