//! Referee Configuration
//!
//! Every tunable threshold used by the tracker, the collision detector, the
//! motion detector and the rule engine lives here. Nothing else in the crate
//! hardcodes a magic number.
//!
//! ## Sections
//!
//! | Section | Used by |
//! |---------|---------|
//! | `detection` | Frame normalisation (confidence floor, overlap merge) |
//! | `presence` | Ball-presence tracker (pot confirmation) |
//! | `collision` | Cue/object-ball contact detection |
//! | `motion` | Table motion / rest detection |
//! | `rules` | Referee timing, snapshots, scratch, policy flags |
//! | `table` | Table outline for rail contact and off-table checks (optional) |
//!
//! ## Usage
//!
//! ```rust
//! use referee_core::config::RefereeConfig;
//!
//! let config = RefereeConfig::default();
//! assert!(config.validate().is_ok());
//!
//! // Older rule revision: invalid pots go back on the table
//! let classic = RefereeConfig::classic();
//! assert!(classic.rules.policy.return_invalid_pots);
//! ```
//!
//! ## Environment Variables
//!
//! - `REFEREE_RULES_PROFILE`: Select preset (`classic`, `standing_pots`, default)

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ConfigError;
use crate::geometry::TableBounds;

/// Complete referee configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RefereeConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub collision: CollisionConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub rules: RuleConfig,
    #[serde(default)]
    pub table: TableConfig,
}

impl RefereeConfig {
    /// First rule revision: invalid pots return to the table, fouls revert,
    /// and the break gets no grace.
    pub fn classic() -> Self {
        Self {
            rules: RuleConfig {
                break_grace: BreakGrace::Turns(0),
                policy: RulePolicy {
                    revert_on_foul: true,
                    return_invalid_pots: true,
                    ..RulePolicy::default()
                },
                ..RuleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Later rule revision: balls potted before a foul stay down.
    pub fn standing_pots() -> Self {
        Self {
            rules: RuleConfig {
                policy: RulePolicy {
                    revert_on_foul: false,
                    return_invalid_pots: false,
                    ..RulePolicy::default()
                },
                ..RuleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load from environment variable REFEREE_RULES_PROFILE or use default
    pub fn from_env_or_default() -> Self {
        match env::var("REFEREE_RULES_PROFILE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "classic" => Self::classic(),
            "standing_pots" => Self::standing_pots(),
            _ => Self::default(),
        }
    }

    /// Parse and validate a JSON configuration. Missing sections use defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make the referee misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.presence.validate()?;
        self.collision.validate()?;
        self.motion.validate()?;
        self.rules.validate()?;
        self.table.validate()?;
        if self.rules.policy.rail_contact_required && self.table.bounds.is_none() {
            return Err(ConfigError::Inconsistent {
                field: "table.bounds",
                reason: "required by rules.policy.rail_contact_required",
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn at_least(field: &'static str, min: u64, value: u64) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { field, min, value })
    }
}

fn within(field: &'static str, min: f64, max: f64, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, min, max, value })
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Detection normalisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Detections below this confidence are discarded (0.0 - 1.0)
    pub confidence_floor: f64,
    /// Same-frame detections overlapping at or above this IoU are merged (0.0 - 1.0)
    pub merge_iou_threshold: f64,
    /// Used to derive frame timestamps when the detector supplies none
    pub frames_per_second: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { confidence_floor: 0.1, merge_iou_threshold: 0.7, frames_per_second: 30.0 }
    }
}

impl DetectionConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        within("detection.confidence_floor", 0.0, 1.0, self.confidence_floor)?;
        within("detection.merge_iou_threshold", 0.0, 1.0, self.merge_iou_threshold)?;
        positive("detection.frames_per_second", self.frames_per_second)
    }
}

/// Ball-presence tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Consecutive missing frames before a disappearance is a confirmed pot
    pub confirm_threshold: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { confirm_threshold: 10 }
    }
}

impl PresenceConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        at_least("presence.confirm_threshold", 1, self.confirm_threshold as u64)
    }
}

/// Collision detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionConfig {
    /// Extra pixels allowed on top of the two radii for a contact
    pub contact_margin: f64,
    /// Minimum displacement of the struck ball, as a fraction of its radius
    pub move_ratio: f64,
    /// Cue and ball must come at least this close (pixels) across the pair
    pub proximity_cutoff: f64,
    /// Frames searched for a vanished ball to reappear
    pub lookahead_frames: u32,
    /// Contacts with the same ball at most this many frames apart are one event
    pub merge_gap: u64,
    /// Frame pairs are evaluated in batches of this many frames
    pub check_interval: u32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            contact_margin: 10.0,
            move_ratio: 0.3,
            proximity_cutoff: 100.0,
            lookahead_frames: 9,
            merge_gap: 2,
            check_interval: 1,
        }
    }
}

impl CollisionConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        within("collision.contact_margin", 0.0, f64::MAX, self.contact_margin)?;
        positive("collision.move_ratio", self.move_ratio)?;
        positive("collision.proximity_cutoff", self.proximity_cutoff)?;
        at_least("collision.check_interval", 1, self.check_interval as u64)
    }
}

/// Motion detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// A ball moving more than this many pixels between frames is in motion
    pub movement_threshold_px: f64,
    /// Consecutive still frames before the table is considered at rest
    pub stable_frames: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self { movement_threshold_px: 2.0, stable_frames: 5 }
    }
}

impl MotionConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        positive("motion.movement_threshold_px", self.movement_threshold_px)?;
        at_least("motion.stable_frames", 1, self.stable_frames as u64)
    }
}

/// Break-shot exemption from the lowest-ball-first rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum BreakGrace {
    /// Grace lasts for the first `n` turns of the rack
    Turns(u32),
    /// Grace lasts for `s` seconds after the game starts
    Seconds(f64),
}

/// Rule revisions that disagreed historically, kept as explicit switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePolicy {
    /// A foul puts this turn's potted balls back on the table
    pub revert_on_foul: bool,
    /// Balls potted after an invalid first hit go back on the table unscored
    pub return_invalid_pots: bool,
    /// A shot that pots nothing must drive some ball to a rail after contact.
    /// Needs `table.bounds`.
    #[serde(default)]
    pub rail_contact_required: bool,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self { revert_on_foul: true, return_invalid_pots: false, rail_contact_required: false }
    }
}

/// Referee timing and rule policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Seconds without motion before the shot is considered over
    pub movement_timeout_s: f64,
    pub break_grace: BreakGrace,
    /// Turn snapshots retained for rollback
    pub max_snapshots: usize,
    /// Consecutive frames without a cue ball before a scratch is called
    pub cue_scratch_frames: u32,
    #[serde(default)]
    pub policy: RulePolicy,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            movement_timeout_s: 3.0,
            break_grace: BreakGrace::Turns(1),
            max_snapshots: 5,
            cue_scratch_frames: 10,
            policy: RulePolicy::default(),
        }
    }
}

impl RuleConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        positive("rules.movement_timeout_s", self.movement_timeout_s)?;
        if let BreakGrace::Seconds(s) = self.break_grace {
            within("rules.break_grace", 0.0, f64::MAX, s)?;
        }
        at_least("rules.max_snapshots", 1, self.max_snapshots as u64)?;
        at_least("rules.cue_scratch_frames", 1, self.cue_scratch_frames as u64)
    }
}

/// Table outline. Without bounds the rail and off-table rules are off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub bounds: Option<TableBounds>,
    /// A ball centre this close to a cushion counts as a rail contact; beyond
    /// the outline by more than this the ball has left the table
    pub rail_margin: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { bounds: None, rail_margin: 50.0 }
    }
}

impl TableConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        within("table.rail_margin", 0.0, f64::MAX, self.rail_margin)?;
        if let Some(b) = self.bounds {
            let finite = [b.left, b.right, b.top, b.bottom].iter().all(|v| v.is_finite());
            if !finite || b.left >= b.right || b.top >= b.bottom {
                return Err(ConfigError::Inconsistent {
                    field: "table.bounds",
                    reason: "edges must be finite with left < right and top < bottom",
                });
            }
        }
        Ok(())
    }
}
