use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::{BallId, BallSet, RefereeEvent};

use super::snapshot::TurnSnapshot;

// =============================================================================
// Lifecycle
// =============================================================================

/// Match lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    #[default]
    Idle,
    Playing,
    /// Frame input is ignored while paused
    Paused,
    Ended,
}

impl MatchPhase {
    pub fn can_start(&self) -> bool {
        matches!(self, MatchPhase::Idle | MatchPhase::Ended)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: usize,
    pub name: String,
    /// Balls credited to this player, in pot order
    pub potted: Vec<u8>,
    pub fouls: u32,
}

impl Player {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), potted: Vec::new(), fouls: 0 }
    }

    pub fn score(&self) -> usize {
        self.potted.len()
    }
}

/// Why a foul was called
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FoulReason {
    /// First contact was not the lowest ball on the table
    WrongBallFirst { expected: u8, hit: u8 },
    /// Cue ball potted
    CueBallPotted,
    /// Cue ball missing from view long enough to be called pocketed
    CueBallScratch,
    /// A ball was seen beyond the table outline
    BallOffTable { ball: BallId },
    /// Nothing potted and no ball reached a rail after contact
    NoRailContact,
    /// Raised by an operator or external rule
    Other { description: String },
}

impl fmt::Display for FoulReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FoulReason::WrongBallFirst { expected, hit } => {
                write!(f, "Must hit ball {} first (hit ball {})", expected, hit)
            }
            FoulReason::CueBallPotted => write!(f, "Cue ball potted"),
            FoulReason::CueBallScratch => write!(f, "Cue ball scratch"),
            FoulReason::BallOffTable { ball } => write!(f, "{} left the table", ball),
            FoulReason::NoRailContact => write!(f, "No ball reached a rail after contact"),
            FoulReason::Other { description } => write!(f, "{}", description),
        }
    }
}

// =============================================================================
// Match state
// =============================================================================

/// Per-turn bookkeeping, cleared at every turn boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnState {
    /// First object ball the cue touched this turn
    pub last_hit_ball: Option<u8>,
    pub contact_made: bool,
    pub potted_this_turn: Vec<u8>,
    /// First-hit foul reported but not applied yet
    pub pending_foul: Option<FoulReason>,
    /// Motion or contact seen; arms the movement timeout
    pub shot_in_progress: bool,
    /// Table has been at rest since the turn began, so new motion is a shot
    pub table_settled: bool,
    /// Some ball reached a cushion during the shot
    pub rail_contact: bool,
    /// First ball seen off the table this turn
    pub left_table: Option<BallId>,
}

/// Everything the referee owns about one match
#[derive(Debug, Clone)]
pub struct MatchState {
    pub phase: MatchPhase,
    pub match_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Capture time of `start`, seconds
    pub start_time_s: f64,
    pub players: [Player; 2],
    pub current_player: usize,
    pub balls_on_table: BallSet,
    pub lowest_ball: u8,
    pub turn_number: u32,
    pub turn: TurnState,
    pub winner: Option<usize>,
    pub balls_moving: bool,
    pub events: Vec<RefereeEvent>,
}

impl Default for MatchState {
    fn default() -> Self {
        Self {
            phase: MatchPhase::Idle,
            match_id: Uuid::nil(),
            started_at: None,
            ended_at: None,
            start_time_s: 0.0,
            players: [Player::new(0, "Player 1"), Player::new(1, "Player 2")],
            current_player: 0,
            balls_on_table: BallSet::full_rack(),
            lowest_ball: 1,
            turn_number: 0,
            turn: TurnState::default(),
            winner: None,
            balls_moving: false,
            events: Vec::new(),
        }
    }
}

impl MatchState {
    pub fn current(&self) -> &Player {
        &self.players[self.current_player]
    }

    pub fn current_name(&self) -> String {
        self.current().name.clone()
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            turn_number: self.turn_number,
            balls_on_table: self.balls_on_table,
            lowest_ball: self.lowest_ball,
            current_player: self.current_player,
            last_hit_ball: self.turn.last_hit_ball,
            potted_this_turn: self.turn.potted_this_turn.clone(),
            contact_made: self.turn.contact_made,
            potted: [self.players[0].potted.clone(), self.players[1].potted.clone()],
            fouls: [self.players[0].fouls, self.players[1].fouls],
        }
    }

    /// Rewind rule state to `snapshot`, keeping the live foul counts.
    /// Returns the balls put back on the table.
    pub fn restore(&mut self, snapshot: &TurnSnapshot) -> Vec<u8> {
        let reverted: Vec<u8> = snapshot
            .balls_on_table
            .iter()
            .filter(|n| !self.balls_on_table.contains(*n))
            .collect();

        self.balls_on_table = snapshot.balls_on_table;
        self.lowest_ball = snapshot.lowest_ball;
        self.turn.last_hit_ball = snapshot.last_hit_ball;
        self.turn.potted_this_turn = snapshot.potted_this_turn.clone();
        self.turn.contact_made = snapshot.contact_made;
        for (player, potted) in self.players.iter_mut().zip(snapshot.potted.iter()) {
            player.potted = potted.clone();
        }
        reverted
    }

    pub fn view(&self) -> GameStateView {
        GameStateView {
            state: self.phase,
            match_id: (!self.match_id.is_nil()).then(|| self.match_id.to_string()),
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id,
                    name: p.name.clone(),
                    score: p.score(),
                    potted: p.potted.clone(),
                    fouls: p.fouls,
                    is_current: p.id == self.current_player,
                })
                .collect(),
            current_player: self.current_name(),
            balls_on_table: self.balls_on_table.to_vec(),
            lowest_ball: self.lowest_ball,
            last_hit_ball: self.turn.last_hit_ball,
            turn_number: self.turn_number,
            balls_moving: self.balls_moving,
        }
    }
}

// =============================================================================
// Read-only view
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: usize,
    pub name: String,
    pub score: usize,
    pub potted: Vec<u8>,
    pub fouls: u32,
    pub is_current: bool,
}

/// Serialisable game-state payload for clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateView {
    pub state: MatchPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    pub players: Vec<PlayerView>,
    pub current_player: String,
    pub balls_on_table: Vec<u8>,
    pub lowest_ball: u8,
    pub last_hit_ball: Option<u8>,
    pub turn_number: u32,
    pub balls_moving: bool,
}
