//! End-of-match payload handed to the archive collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RefereeEvent;

use super::state::MatchState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: usize,
    pub name: String,
    pub score: usize,
    pub potted: Vec<u8>,
    pub fouls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: String,
    pub winner_id: usize,
    pub duration_s: f64,
}

/// Complete record of a finished match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub players: Vec<PlayerSummary>,
    pub result: MatchResult,
    pub events: Vec<RefereeEvent>,
}

impl MatchSummary {
    /// `None` unless the match has a winner and both timestamps
    pub fn from_state(state: &MatchState, duration_s: f64) -> Option<Self> {
        let winner_id = state.winner?;
        let winner = state.players.get(winner_id)?;
        Some(Self {
            match_id: state.match_id,
            started_at: state.started_at?,
            ended_at: state.ended_at?,
            players: state
                .players
                .iter()
                .map(|p| PlayerSummary {
                    id: p.id,
                    name: p.name.clone(),
                    score: p.score(),
                    potted: p.potted.clone(),
                    fouls: p.fouls,
                })
                .collect(),
            result: MatchResult { winner: winner.name.clone(), winner_id, duration_s },
            events: state.events.clone(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
