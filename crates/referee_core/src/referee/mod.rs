//! Referee State Machine
//!
//! Owns the match: players, balls on the table, the current turn and the
//! snapshot ring used to roll a turn back on a foul. It consumes facts that
//! the perception side has already decided (first contact, confirmed pot,
//! cue missing, table at rest) and turns them into rule decisions.
//!
//! ## Lifecycle
//!
//! ```text
//!   Idle ──start──► Playing ──9-ball win──► Ended ──start──► Playing
//!                    │   ▲
//!              pause │   │ resume
//!                    ▼   │
//!                   Paused
//! ```
//!
//! ## Turn flow
//!
//! 1. `record_collision`: first contact of the turn decides validity
//! 2. `record_pot`: scoring, 9-ball handling, pre-contact pots
//! 3. `check_movement_timeout` / `finalize_turn`: pending foul, continue or switch
//!
//! A turn ends on at most one foul. When several apply, the first in this
//! order is called:
//!
//! | Order | Foul | Raised by |
//! |-------|------|-----------|
//! | 1 | ball off table | `note_ball_off_table` |
//! | 2 | wrong ball first | `record_collision` |
//! | 3 | no rail contact | `finalize_turn`, when `rail_contact_required` |
//!
//! Cue-ball pots and scratches are called immediately.
//!
//! Motion only starts a shot once the table has been at rest during the
//! turn; balls still rolling from the previous shot belong to that shot.
//!
//! Every operation returns the events it produced. Rule transitions are
//! appended to the match log; `invalid` events are returned only.
//!
//! Time comes from the frame clock (`set_clock`), never from the wall clock,
//! so replays of the same frames produce the same decisions.

pub mod snapshot;
pub mod state;
pub mod summary;

#[cfg(test)]
mod scenario_tests;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{BreakGrace, RuleConfig};
use crate::error::{ConfigError, InputError, RefereeError, Result};
use crate::models::{BallId, EventKind, RefereeEvent, NINE_BALL};
use crate::presence::{BallPresenceTracker, Reappearance};

pub use snapshot::{SnapshotRing, TurnSnapshot};
pub use state::{FoulReason, GameStateView, MatchPhase, MatchState, Player, PlayerView, TurnState};
pub use summary::{MatchResult, MatchSummary, PlayerSummary};

/// Frame position used to stamp events and evaluate time-based rules
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    pub frame: u64,
    /// Seconds since capture start
    pub timestamp: f64,
}

pub struct Referee {
    config: RuleConfig,
    state: MatchState,
    snapshots: SnapshotRing,
    clock: FrameClock,
    cue_missing_frames: u32,
    /// Set once a scratch is called, cleared when the cue is seen again
    scratch_latched: bool,
    finished: Option<MatchSummary>,
    /// Inconsistencies met since the last `take_faults`
    faults: Vec<RefereeError>,
}

impl Referee {
    pub fn new(config: RuleConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            snapshots: SnapshotRing::new(config.max_snapshots),
            config,
            state: MatchState::default(),
            clock: FrameClock::default(),
            cue_missing_frames: 0,
            scratch_latched: false,
            finished: None,
            faults: Vec::new(),
        })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase
    }

    pub fn snapshots(&self) -> &SnapshotRing {
        &self.snapshots
    }

    /// Cumulative match log
    pub fn events(&self) -> &[RefereeEvent] {
        &self.state.events
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    /// Set the frame position for subsequent events
    pub fn set_clock(&mut self, frame: u64, timestamp: f64) {
        self.clock = FrameClock { frame, timestamp };
    }

    pub fn game_state(&self) -> GameStateView {
        self.state.view()
    }

    /// Summary of the last finished match, handed out once
    pub fn take_finished_match(&mut self) -> Option<MatchSummary> {
        self.finished.take()
    }

    /// State inconsistencies recorded since the last call
    pub fn take_faults(&mut self) -> Vec<RefereeError> {
        std::mem::take(&mut self.faults)
    }

    fn playing(&self) -> bool {
        self.state.phase == MatchPhase::Playing
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Begin a new rack. Allowed from Idle or Ended.
    pub fn start(
        &mut self,
        player1: &str,
        player2: &str,
        starting_player: usize,
    ) -> Result<Vec<RefereeEvent>> {
        if !self.state.phase.can_start() {
            return Err(RefereeError::InvalidTransition {
                action: "start",
                phase: self.state.phase,
            });
        }
        if starting_player > 1 {
            return Err(InputError::InvalidStartingPlayer(starting_player).into());
        }

        self.state = MatchState {
            phase: MatchPhase::Playing,
            match_id: Uuid::new_v4(),
            started_at: Some(Utc::now()),
            start_time_s: self.clock.timestamp,
            players: [Player::new(0, player1), Player::new(1, player2)],
            current_player: starting_player,
            ..MatchState::default()
        };
        self.snapshots.clear();
        self.cue_missing_frames = 0;
        self.scratch_latched = false;
        self.finished = None;
        self.faults.clear();
        self.begin_turn();

        log::info!(
            "Game {} started: {} vs {}, {} breaks",
            self.state.match_id,
            player1,
            player2,
            self.state.current_name()
        );

        let mut out = Vec::new();
        let kind = EventKind::GameStart {
            player1: player1.to_string(),
            player2: player2.to_string(),
            starting_player,
            match_id: self.state.match_id.to_string(),
        };
        let message = format!("Game started: {} vs {}", player1, player2);
        self.emit(kind, message, &mut out);
        Ok(out)
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state.phase != MatchPhase::Playing {
            return Err(RefereeError::InvalidTransition { action: "pause", phase: self.state.phase });
        }
        self.state.phase = MatchPhase::Paused;
        log::info!("Game {} paused", self.state.match_id);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state.phase != MatchPhase::Paused {
            return Err(RefereeError::InvalidTransition { action: "resume", phase: self.state.phase });
        }
        self.state.phase = MatchPhase::Playing;
        log::info!("Game {} resumed", self.state.match_id);
        Ok(())
    }

    /// Back to Idle, discarding the match
    pub fn reset(&mut self) {
        self.state = MatchState::default();
        self.snapshots.clear();
        self.cue_missing_frames = 0;
        self.scratch_latched = false;
        self.finished = None;
        self.faults.clear();
        log::info!("Referee reset");
    }

    /// Re-base the match start time, e.g. on the first frame after `start`
    pub fn anchor_start_time(&mut self, timestamp: f64) {
        if self.playing() {
            self.state.start_time_s = timestamp;
        }
    }

    /// Break-shot exemption from the lowest-ball-first rule
    pub fn in_break_grace(&self) -> bool {
        match self.config.break_grace {
            BreakGrace::Turns(turns) => self.state.turn_number <= turns,
            BreakGrace::Seconds(seconds) => {
                self.clock.timestamp - self.state.start_time_s < seconds
            }
        }
    }

    // =========================================================================
    // Shot events
    // =========================================================================

    /// First cue contact of the turn. Later contacts are ignored.
    pub fn record_collision(&mut self, ball: &str) -> Vec<RefereeEvent> {
        let number = match parse_object_ball(ball) {
            Ok(n) => n,
            Err(err) => return self.invalid(ball, err),
        };
        if !self.playing() {
            return Vec::new();
        }

        let turn = &mut self.state.turn;
        turn.contact_made = true;
        turn.shot_in_progress = true;
        if turn.last_hit_ball.is_some() {
            return Vec::new();
        }
        turn.last_hit_ball = Some(number);

        let lowest = self.state.lowest_ball;
        let in_grace = self.in_break_grace();
        let valid = number == lowest || in_grace;

        let foul = (!valid).then(|| FoulReason::WrongBallFirst { expected: lowest, hit: number });
        self.state.turn.pending_foul = foul.clone();

        let name = self.state.current_name();
        let message = if valid {
            format!("{} hit ball {}", name, number)
        } else {
            format!("{} hit ball {}, must hit ball {} first", name, number, lowest)
        };
        log::debug!("frame {}: first hit {} (valid: {})", self.clock.frame, number, valid);

        let mut out = Vec::new();
        let kind = EventKind::FirstHit {
            ball: number,
            valid,
            lowest_ball: lowest,
            in_break_grace: in_grace,
            foul_reason: foul.map(|f| f.to_string()),
        };
        self.emit(kind, message, &mut out);
        out
    }

    /// Confirmed pot. Potting the cue ball is a scratch foul.
    pub fn record_pot(&mut self, ball: &str) -> Vec<RefereeEvent> {
        let id = match ball.parse::<BallId>() {
            Ok(id) => id,
            Err(err) => return self.invalid(ball, err),
        };
        if !self.playing() {
            return Vec::new();
        }
        let number = match id {
            BallId::Cue => return self.record_foul(FoulReason::CueBallPotted),
            BallId::Object(n) => n,
        };
        if !self.state.balls_on_table.contains(number) {
            log::debug!("ball {} already off the table, ignoring pot", number);
            return Vec::new();
        }

        let mut out = Vec::new();
        let name = self.state.current_name();

        if self.state.turn.left_table == Some(id) {
            let flags = PotFlags { returned: true, ..PotFlags::default() };
            let message = format!("Ball {} left the table, respotted", number);
            self.emit(potted(number, flags), message, &mut out);
            return out;
        }

        if !self.state.turn.contact_made {
            if number == NINE_BALL {
                // Respotted: a 9-ball can only win after contact
                let flags = PotFlags { pre_contact: true, early_nine: true, ..PotFlags::default() };
                let message = "Ball 9 potted before contact, respotted".to_string();
                self.emit(potted(number, flags), message, &mut out);
                return out;
            }
            self.take_off_table(number);
            let flags = PotFlags { pre_contact: true, ..PotFlags::default() };
            let message = format!("Ball {} potted before contact", number);
            self.emit(potted(number, flags), message, &mut out);
            return out;
        }

        let fouled =
            self.state.turn.pending_foul.is_some() || self.state.turn.left_table.is_some();
        if fouled && self.config.policy.return_invalid_pots {
            let flags = PotFlags { returned: true, ..PotFlags::default() };
            let message =
                format!("Ball {} potted after an invalid hit, returned to the table", number);
            self.emit(potted(number, flags), message, &mut out);
            return out;
        }

        if number == NINE_BALL {
            let last_remaining = self.state.balls_on_table.len() == 1;
            let first_contacted = self.state.turn.last_hit_ball == Some(NINE_BALL);
            if fouled || !(last_remaining || first_contacted) {
                let flags = PotFlags { early_nine: true, ..PotFlags::default() };
                let message = format!("Early 9-ball pot by {}, returned to the table", name);
                self.emit(potted(number, flags), message, &mut out);
                return out;
            }

            self.take_off_table(number);
            self.state.players[self.state.current_player].potted.push(number);
            let flags = PotFlags { scored: true, game_end: true, ..PotFlags::default() };
            let message = format!("{} potted the 9-ball", name);
            self.emit(potted(number, flags), message, &mut out);
            self.end_game(self.state.current_player, &mut out);
            return out;
        }

        self.take_off_table(number);
        self.state.players[self.state.current_player].potted.push(number);
        log::info!("{} potted ball {}", name, number);
        let flags = PotFlags { scored: true, ..PotFlags::default() };
        let message = format!("{} potted ball {}", name, number);
        self.emit(potted(number, flags), message, &mut out);
        out
    }

    /// Charge a foul to the player at the table, roll the turn back if the
    /// policy says so, and pass the table.
    pub fn record_foul(&mut self, reason: FoulReason) -> Vec<RefereeEvent> {
        if !self.playing() {
            return Vec::new();
        }
        let current = self.state.current_player;
        self.state.players[current].fouls += 1;
        let foul_count = self.state.players[current].fouls;

        let reverted_balls = if self.config.policy.revert_on_foul {
            match self.rollback() {
                Ok(balls) => balls,
                Err(err) => {
                    log::error!("{}, nothing reverted", err);
                    self.faults.push(err);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        self.state.turn.pending_foul = None;

        let name = self.state.current_name();
        log::info!("Foul by {} ({}): {}", name, foul_count, reason);

        let mut out = Vec::new();
        let message = format!("Foul by {}: {}", name, reason);
        let kind = EventKind::Foul { reason: reason.to_string(), reverted_balls, foul_count };
        self.emit(kind, message, &mut out);
        out.extend(self.switch_turn());
        out
    }

    // =========================================================================
    // Turn boundaries
    // =========================================================================

    /// Poll: end the shot once the table has been still long enough
    pub fn check_movement_timeout(&mut self, elapsed_since_motion: f64) -> Vec<RefereeEvent> {
        if !self.playing() || !self.state.turn.shot_in_progress {
            return Vec::new();
        }
        if elapsed_since_motion < self.config.movement_timeout_s {
            return Vec::new();
        }
        log::debug!(
            "frame {}: no motion for {:.2}s, closing turn",
            self.clock.frame,
            elapsed_since_motion
        );
        self.finalize_turn()
    }

    /// Apply a pending foul, otherwise continue after a pot or pass the table
    pub fn finalize_turn(&mut self) -> Vec<RefereeEvent> {
        if !self.playing() {
            return Vec::new();
        }
        if let Some(foul) = self.take_turn_foul() {
            return self.record_foul(foul);
        }
        if self.state.turn.potted_this_turn.is_empty() {
            return self.switch_turn();
        }

        let potted = self.state.turn.potted_this_turn.clone();
        self.begin_turn();
        let name = self.state.current_name();
        log::info!("{} continues (potted {:?})", name, potted);

        let mut out = Vec::new();
        let message = format!("{} continues", name);
        self.emit(EventKind::TurnContinue { potted }, message, &mut out);
        out
    }

    pub fn switch_turn(&mut self) -> Vec<RefereeEvent> {
        if !self.playing() {
            return Vec::new();
        }
        let previous_player = self.state.current_name();
        self.state.current_player = 1 - self.state.current_player;
        self.begin_turn();

        let name = self.state.current_name();
        log::info!("Turn {}: {} to play", self.state.turn_number, name);

        let mut out = Vec::new();
        let message = format!("Turn: {}", name);
        self.emit(EventKind::TurnChange { previous_player }, message, &mut out);
        out
    }

    /// Highest-priority foul of the turn, clearing the pending ones
    fn take_turn_foul(&mut self) -> Option<FoulReason> {
        let rail_required = self.config.policy.rail_contact_required;
        let turn = &mut self.state.turn;
        let wrong_ball = turn.pending_foul.take();
        if let Some(ball) = turn.left_table.take() {
            return Some(FoulReason::BallOffTable { ball });
        }
        if wrong_ball.is_some() {
            return wrong_ball;
        }
        let no_rail = rail_required
            && turn.contact_made
            && turn.potted_this_turn.is_empty()
            && !turn.rail_contact;
        no_rail.then_some(FoulReason::NoRailContact)
    }

    /// Rewind to the latest turn snapshot
    fn rollback(&mut self) -> Result<Vec<u8>> {
        let snapshot = self.snapshots.latest().ok_or_else(|| {
            RefereeError::StateInconsistency("foul with no turn snapshot".to_string())
        })?;
        Ok(self.state.restore(snapshot))
    }

    /// Clear per-turn fields and snapshot the new turn
    fn begin_turn(&mut self) {
        self.state.turn = TurnState::default();
        self.state.turn_number += 1;
        self.snapshots.push(self.state.snapshot());
    }

    // =========================================================================
    // Per-frame polls
    // =========================================================================

    /// Count frames without a cue ball; one scratch per disappearance
    pub fn check_cue_scratch(&mut self, cue_visible: bool) -> Vec<RefereeEvent> {
        if cue_visible {
            self.cue_missing_frames = 0;
            self.scratch_latched = false;
            return Vec::new();
        }
        if !self.playing() {
            return Vec::new();
        }

        self.cue_missing_frames = self.cue_missing_frames.saturating_add(1);
        if self.scratch_latched || self.cue_missing_frames < self.config.cue_scratch_frames {
            return Vec::new();
        }
        self.scratch_latched = true;

        let mut out = Vec::new();
        let missing_frames = self.cue_missing_frames;
        let message = format!("Cue ball scratch after {} missing frames", missing_frames);
        self.emit(EventKind::CueballScratch { missing_frames }, message, &mut out);
        out.extend(self.record_foul(FoulReason::CueBallScratch));
        out
    }

    /// Lowest ball both on the rules' table and exactly OnTable in the
    /// tracker. Keeps the previous value when nothing qualifies.
    pub fn update_lowest_ball(&mut self, tracker: &BallPresenceTracker) -> u8 {
        let candidate = self
            .state
            .balls_on_table
            .iter()
            .find(|n| tracker.is_on_table(BallId::Object(*n)));
        if let Some(lowest) = candidate {
            if lowest != self.state.lowest_ball {
                log::debug!("Lowest ball {} -> {}", self.state.lowest_ball, lowest);
            }
            self.state.lowest_ball = lowest;
        }
        self.state.lowest_ball
    }

    /// Motion arms the movement timeout, but only once the table has come to
    /// rest during this turn.
    pub fn note_motion(&mut self, moving: bool, at_rest: bool) {
        self.state.balls_moving = moving;
        if !self.playing() {
            return;
        }
        let turn = &mut self.state.turn;
        if at_rest {
            turn.table_settled = true;
        }
        if moving && turn.table_settled && !turn.shot_in_progress {
            log::debug!("frame {}: shot started", self.clock.frame);
            turn.shot_in_progress = true;
        }
    }

    /// A moving ball reached a cushion. Counts once a shot is in progress.
    pub fn note_rail_contact(&mut self, ball: BallId) {
        if !self.playing() || !self.state.turn.shot_in_progress || self.state.turn.rail_contact {
            return;
        }
        log::debug!("frame {}: {} reached a rail", self.clock.frame, ball);
        self.state.turn.rail_contact = true;
    }

    /// A ball seen beyond the table outline. Fouls at the end of the turn;
    /// only the first ball per turn is reported.
    pub fn note_ball_off_table(&mut self, ball: BallId) -> Vec<RefereeEvent> {
        if !self.playing() || self.state.turn.left_table.is_some() {
            return Vec::new();
        }
        self.state.turn.left_table = Some(ball);
        log::info!("{} left the table", ball);

        let mut out = Vec::new();
        self.emit(EventKind::BallOffTable { ball }, format!("{} left the table", ball), &mut out);
        out
    }

    pub fn note_ball_missing(&mut self, ball: BallId) -> Vec<RefereeEvent> {
        if !self.playing() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.emit(EventKind::BallMissing { ball }, format!("{} missing", ball), &mut out);
        out
    }

    /// A ball taken off the table during this turn that shows up again is
    /// put back: the pot was false.
    pub fn note_ball_reappeared(&mut self, reappearance: &Reappearance) -> Vec<RefereeEvent> {
        if !self.playing() {
            return Vec::new();
        }
        let ball = reappearance.ball;
        let mut pot_reverted = false;

        if let Some(number) = ball.number() {
            let turn = &mut self.state.turn;
            if let Some(pos) = turn.potted_this_turn.iter().position(|&n| n == number) {
                turn.potted_this_turn.remove(pos);
                self.state.balls_on_table.insert(number);
                for player in self.state.players.iter_mut() {
                    player.potted.retain(|&n| n != number);
                }
                self.refresh_lowest_from_table();
                pot_reverted = true;
                log::info!("{} back on the table, pot reverted", ball);
            }
        }

        let mut out = Vec::new();
        let message = format!("{} reappeared after {} frames", ball, reappearance.missing_frames);
        let kind = EventKind::BallReappeared {
            ball,
            missing_frames: reappearance.missing_frames,
            was_potted: reappearance.was_potted,
            pot_reverted,
        };
        self.emit(kind, message, &mut out);
        out
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn take_off_table(&mut self, number: u8) {
        self.state.balls_on_table.remove(number);
        self.state.turn.potted_this_turn.push(number);
        self.refresh_lowest_from_table();
    }

    fn refresh_lowest_from_table(&mut self) {
        if let Some(lowest) = self.state.balls_on_table.min() {
            self.state.lowest_ball = lowest;
        }
    }

    fn end_game(&mut self, winner: usize, out: &mut Vec<RefereeEvent>) {
        self.state.phase = MatchPhase::Ended;
        self.state.winner = Some(winner);
        self.state.ended_at = Some(Utc::now());
        let duration_s = (self.clock.timestamp - self.state.start_time_s).max(0.0);

        let [p1, p2] = &self.state.players;
        let winner_name = self.state.players[winner].name.clone();
        let kind = EventKind::GameEnd {
            winner: winner_name.clone(),
            winner_id: winner,
            player1_score: p1.score(),
            player2_score: p2.score(),
            player1_fouls: p1.fouls,
            player2_fouls: p2.fouls,
            duration_s,
        };
        log::info!("Game {} over: {} wins after {:.1}s", self.state.match_id, winner_name, duration_s);
        self.emit(kind, format!("{} wins!", winner_name), out);

        self.finished = MatchSummary::from_state(&self.state, duration_s);
    }

    fn emit(&mut self, kind: EventKind, message: String, out: &mut Vec<RefereeEvent>) {
        let event = RefereeEvent {
            frame: self.clock.frame,
            timestamp: self.clock.timestamp,
            player: Some(self.state.current_name()),
            message,
            kind,
        };
        self.state.events.push(event.clone());
        out.push(event);
    }

    /// Malformed input: reported, never applied, not logged to the match
    fn invalid(&self, input: &str, err: InputError) -> Vec<RefereeEvent> {
        log::warn!("frame {}: ignoring input {:?}: {}", self.clock.frame, input, err);
        vec![RefereeEvent {
            frame: self.clock.frame,
            timestamp: self.clock.timestamp,
            player: None,
            message: format!("Invalid input {:?}", input),
            kind: EventKind::Invalid { input: input.to_string(), reason: err.to_string() },
        }]
    }
}

/// Label of a numbered ball
fn parse_object_ball(label: &str) -> std::result::Result<u8, InputError> {
    match label.parse::<BallId>()? {
        BallId::Cue => Err(InputError::CueNotObjectBall),
        BallId::Object(n) => Ok(n),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PotFlags {
    scored: bool,
    pre_contact: bool,
    early_nine: bool,
    returned: bool,
    game_end: bool,
}

fn potted(ball: u8, flags: PotFlags) -> EventKind {
    EventKind::Potted {
        ball,
        scored: flags.scored,
        pre_contact: flags.pre_contact,
        early_nine: flags.early_nine,
        returned: flags.returned,
        game_end: flags.game_end,
    }
}
