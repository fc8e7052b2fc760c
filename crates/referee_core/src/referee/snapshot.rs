//! Turn snapshots for foul rollback
//!
//! A `TurnSnapshot` is captured at the start of every turn and is never
//! mutated afterwards. Snapshots live in a bounded ring: pushing past capacity
//! evicts the oldest.
//!
//! Rollback reads the most recent snapshot only; deeper history is kept for
//! inspection.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::models::BallSet;

/// Rule state at the start of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub turn_number: u32,
    pub balls_on_table: BallSet,
    pub lowest_ball: u8,
    pub current_player: usize,
    pub last_hit_ball: Option<u8>,
    pub potted_this_turn: Vec<u8>,
    pub contact_made: bool,
    /// Potted balls per player, indexed by player
    pub potted: [Vec<u8>; 2],
    /// Foul counts per player, indexed by player
    pub fouls: [u32; 2],
}

/// Fixed-capacity snapshot history
#[derive(Debug, Clone)]
pub struct SnapshotRing {
    snapshots: VecDeque<TurnSnapshot>,
    capacity: usize,
}

impl SnapshotRing {
    /// `capacity` is clamped to at least one slot
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { snapshots: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, snapshot: TurnSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&TurnSnapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TurnSnapshot> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
