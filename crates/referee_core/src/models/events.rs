use serde::{Deserialize, Serialize};

use super::ball::BallId;

/// Outward referee event: a common envelope plus a type-specific payload.
///
/// Serialises flat, e.g.
/// `{"frame": 42, "timestamp": 1.4, "player": "Ann", "message": "...", "type": "first_hit", "ball": 3, ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefereeEvent {
    /// Frame index the event was decided on
    pub frame: u64,
    /// Seconds since capture start
    pub timestamp: f64,
    /// Name of the player the event concerns (usually the player at the table)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    /// Human readable summary
    pub message: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RefereeEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    GameStart {
        player1: String,
        player2: String,
        starting_player: usize,
        match_id: String,
    },
    FirstHit {
        ball: u8,
        valid: bool,
        lowest_ball: u8,
        in_break_grace: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        foul_reason: Option<String>,
    },
    Potted {
        ball: u8,
        /// Credited to the player at the table
        scored: bool,
        /// Disappeared before the cue touched anything this turn
        pre_contact: bool,
        /// 9-ball potted early: returned to the table, no win
        early_nine: bool,
        /// Potted after an invalid first hit and returned to the table
        returned: bool,
        game_end: bool,
    },
    Foul {
        reason: String,
        reverted_balls: Vec<u8>,
        foul_count: u32,
    },
    TurnChange {
        previous_player: String,
    },
    TurnContinue {
        potted: Vec<u8>,
    },
    BallMissing {
        ball: BallId,
    },
    BallReappeared {
        ball: BallId,
        missing_frames: u32,
        /// The ball had already been confirmed potted
        was_potted: bool,
        /// A pot from this turn was undone
        pot_reverted: bool,
    },
    CueballScratch {
        missing_frames: u32,
    },
    BallOffTable {
        ball: BallId,
    },
    GameEnd {
        winner: String,
        winner_id: usize,
        player1_score: usize,
        player2_score: usize,
        player1_fouls: u32,
        player2_fouls: u32,
        duration_s: f64,
    },
    /// Malformed input; nothing was changed
    Invalid {
        input: String,
        reason: String,
    },
}

/// Discriminant of `EventKind`, for filtering and exhaustive dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    GameStart,
    FirstHit,
    Potted,
    Foul,
    TurnChange,
    TurnContinue,
    BallMissing,
    BallReappeared,
    CueballScratch,
    BallOffTable,
    GameEnd,
    Invalid,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::GameStart { .. } => EventType::GameStart,
            EventKind::FirstHit { .. } => EventType::FirstHit,
            EventKind::Potted { .. } => EventType::Potted,
            EventKind::Foul { .. } => EventType::Foul,
            EventKind::TurnChange { .. } => EventType::TurnChange,
            EventKind::TurnContinue { .. } => EventType::TurnContinue,
            EventKind::BallMissing { .. } => EventType::BallMissing,
            EventKind::BallReappeared { .. } => EventType::BallReappeared,
            EventKind::CueballScratch { .. } => EventType::CueballScratch,
            EventKind::BallOffTable { .. } => EventType::BallOffTable,
            EventKind::GameEnd { .. } => EventType::GameEnd,
            EventKind::Invalid { .. } => EventType::Invalid,
        }
    }
}
