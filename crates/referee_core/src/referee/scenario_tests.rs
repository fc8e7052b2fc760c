//! Rule scenarios driven through the public referee operations.

use super::*;
use crate::config::{PresenceConfig, RefereeConfig, RulePolicy};
use crate::models::{BallSet, EventType};

fn referee_with(config: RuleConfig) -> Referee {
    let mut referee = Referee::new(config).unwrap();
    referee.start("Ann", "Bob", 0).unwrap();
    referee
}

fn referee() -> Referee {
    referee_with(RuleConfig::default())
}

/// No break grace at all
fn strict() -> Referee {
    referee_with(RuleConfig { break_grace: BreakGrace::Turns(0), ..RuleConfig::default() })
}

fn types(events: &[RefereeEvent]) -> Vec<EventType> {
    events.iter().map(RefereeEvent::event_type).collect()
}

fn pot_flags(event: &RefereeEvent) -> (bool, bool, bool, bool, bool) {
    match &event.kind {
        EventKind::Potted { scored, pre_contact, early_nine, returned, game_end, .. } => {
            (*scored, *pre_contact, *early_nine, *returned, *game_end)
        }
        other => panic!("expected potted event, got {:?}", other),
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_start_emits_game_start_and_snapshot() {
    let referee = referee();
    assert_eq!(referee.phase(), MatchPhase::Playing);
    assert_eq!(types(referee.events()), vec![EventType::GameStart]);
    assert_eq!(referee.snapshots().len(), 1);
    assert_eq!(referee.state().turn_number, 1);
    assert!(!referee.state().match_id.is_nil());
}

#[test]
fn test_start_while_playing_is_rejected() {
    let mut referee = referee();
    let err = referee.start("Cy", "Di", 1).unwrap_err();
    assert_eq!(
        err,
        RefereeError::InvalidTransition { action: "start", phase: MatchPhase::Playing }
    );
    assert_eq!(referee.state().players[0].name, "Ann");
}

#[test]
fn test_invalid_starting_player() {
    let mut referee = Referee::new(RuleConfig::default()).unwrap();
    assert_eq!(
        referee.start("Ann", "Bob", 2),
        Err(RefereeError::Input(InputError::InvalidStartingPlayer(2)))
    );
    assert_eq!(referee.phase(), MatchPhase::Idle);
}

#[test]
fn test_paused_referee_ignores_shots() {
    let mut referee = referee();
    referee.pause().unwrap();
    assert!(referee.record_collision("bi1").is_empty());
    assert!(referee.record_pot("bi1").is_empty());
    assert!(referee.pause().is_err());
    referee.resume().unwrap();
    assert_eq!(referee.record_collision("bi1").len(), 1);
}

#[test]
fn test_reset_returns_to_idle() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.reset();
    assert_eq!(referee.phase(), MatchPhase::Idle);
    assert!(referee.events().is_empty());
    assert!(referee.snapshots().is_empty());
    assert!(referee.start("Ann", "Bob", 1).is_ok());
}

// =============================================================================
// First hit
// =============================================================================

#[test]
fn test_break_grace_accepts_any_first_hit() {
    let mut referee = referee();
    assert!(referee.in_break_grace());
    let events = referee.record_collision("bi7");
    match &events[0].kind {
        EventKind::FirstHit { ball, valid, in_break_grace, foul_reason, .. } => {
            assert_eq!(*ball, 7);
            assert!(*valid);
            assert!(*in_break_grace);
            assert!(foul_reason.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(referee.state().turn.pending_foul.is_none());
}

#[test]
fn test_grace_pot_scores_and_lowest_advances() {
    let mut referee = referee();
    let hit = referee.record_collision("bi1");
    assert!(matches!(hit[0].kind, EventKind::FirstHit { valid: true, .. }));

    let pot = referee.record_pot("bi1");
    assert_eq!(pot_flags(&pot[0]), (true, false, false, false, false));
    assert_eq!(pot[0].player.as_deref(), Some("Ann"));
    assert_eq!(referee.state().players[0].potted, vec![1]);
    assert_eq!(referee.state().lowest_ball, 2);
}

#[test]
fn test_wrong_first_hit_after_grace_then_foul() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.record_pot("bi1");
    let cont = referee.finalize_turn();
    assert_eq!(types(&cont), vec![EventType::TurnContinue]);
    assert!(!referee.in_break_grace());

    let hit = referee.record_collision("bi5");
    match &hit[0].kind {
        EventKind::FirstHit { valid, lowest_ball, foul_reason, .. } => {
            assert!(!valid);
            assert_eq!(*lowest_ball, 2);
            assert_eq!(foul_reason.as_deref(), Some("Must hit ball 2 first (hit ball 5)"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let events = referee.record_foul(FoulReason::WrongBallFirst { expected: 2, hit: 5 });
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert_eq!(referee.state().players[0].fouls, 1);
    assert_eq!(referee.state().current_player, 1);
    // Ball 1 was potted on an earlier turn and stays down
    assert!(!referee.state().balls_on_table.contains(1));
    assert_eq!(referee.state().players[0].potted, vec![1]);
}

#[test]
fn test_only_first_contact_counts() {
    let mut referee = strict();
    assert_eq!(referee.record_collision("bi1").len(), 1);
    assert!(referee.record_collision("bi4").is_empty());
    assert_eq!(referee.state().turn.last_hit_ball, Some(1));
    assert!(referee.state().turn.pending_foul.is_none());
}

#[test]
fn test_pending_foul_applied_on_finalize() {
    let mut referee = strict();
    referee.record_collision("bi3");
    let events = referee.finalize_turn();
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert_eq!(referee.state().players[0].fouls, 1);
}

#[test]
fn test_seconds_break_grace() {
    let config = RuleConfig { break_grace: BreakGrace::Seconds(2.0), ..RuleConfig::default() };
    let mut referee = Referee::new(config).unwrap();
    referee.set_clock(30, 1.0);
    referee.start("Ann", "Bob", 0).unwrap();

    referee.set_clock(60, 2.5);
    assert!(referee.in_break_grace());
    referee.set_clock(120, 3.5);
    assert!(!referee.in_break_grace());
    let hit = referee.record_collision("bi4");
    assert!(matches!(hit[0].kind, EventKind::FirstHit { valid: false, in_break_grace: false, .. }));
    assert_eq!(hit[0].frame, 120);
}

// =============================================================================
// Pots
// =============================================================================

#[test]
fn test_pre_contact_pot_is_removed_without_score() {
    let mut referee = referee();
    let pot = referee.record_pot("bi3");
    assert_eq!(pot_flags(&pot[0]), (false, true, false, false, false));
    assert!(!referee.state().balls_on_table.contains(3));
    assert!(referee.state().players[0].potted.is_empty());
    assert_eq!(referee.state().players[0].fouls, 0);

    // A ball left the table this turn, so the player continues
    assert_eq!(types(&referee.finalize_turn()), vec![EventType::TurnContinue]);
}

#[test]
fn test_pre_contact_nine_is_respotted() {
    let mut referee = referee();
    let pot = referee.record_pot("bi9");
    assert_eq!(pot_flags(&pot[0]), (false, true, true, false, false));
    assert!(referee.state().balls_on_table.contains(9));
    assert_eq!(referee.phase(), MatchPhase::Playing);
}

#[test]
fn test_pot_of_ball_already_off_table_is_noop() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.record_pot("bi1");
    let log_len = referee.events().len();
    assert!(referee.record_pot("bi1").is_empty());
    assert_eq!(referee.events().len(), log_len);
}

#[test]
fn test_early_nine_returns_to_table() {
    let mut referee = strict();
    referee.record_collision("bi1");
    let pot = referee.record_pot("bi9");
    assert_eq!(pot_flags(&pot[0]), (false, false, true, false, false));
    assert_eq!(referee.phase(), MatchPhase::Playing);
    assert!(referee.state().balls_on_table.contains(9));
    assert!(referee.take_finished_match().is_none());
}

#[test]
fn test_nine_as_first_hit_wins() {
    let mut referee = referee();
    referee.set_clock(90, 3.0);
    referee.record_collision("bi9");
    let events = referee.record_pot("bi9");
    assert_eq!(types(&events), vec![EventType::Potted, EventType::GameEnd]);
    assert_eq!(pot_flags(&events[0]), (true, false, false, false, true));
    assert_eq!(referee.phase(), MatchPhase::Ended);
    assert_eq!(referee.state().winner, Some(0));

    let summary = referee.take_finished_match().unwrap();
    assert_eq!(summary.result.winner, "Ann");
    assert_eq!(summary.result.duration_s, 3.0);
    assert_eq!(summary.match_id, referee.state().match_id);
    assert_eq!(summary.events.last().unwrap().event_type(), EventType::GameEnd);
    assert!(referee.take_finished_match().is_none());

    // Game over: further input is ignored, a new rack may start
    assert!(referee.record_collision("bi1").is_empty());
    assert!(referee.start("Ann", "Bob", 1).is_ok());
}

#[test]
fn test_nine_as_last_ball_wins() {
    let mut referee = referee();
    referee.record_collision("bi1");
    for n in 1..=8 {
        referee.record_pot(&format!("bi{}", n));
    }
    assert_eq!(referee.state().balls_on_table.to_vec(), vec![9]);

    let events = referee.record_pot("bi9");
    match &events[1].kind {
        EventKind::GameEnd { winner, winner_id, player1_score, player2_score, .. } => {
            assert_eq!(winner, "Ann");
            assert_eq!(*winner_id, 0);
            assert_eq!(*player1_score, 9);
            assert_eq!(*player2_score, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_fouled_nine_does_not_win() {
    let mut referee = strict();
    referee.record_collision("bi9");
    let pot = referee.record_pot("bi9");
    assert_eq!(pot_flags(&pot[0]), (false, false, true, false, false));
    assert_eq!(referee.phase(), MatchPhase::Playing);
}

#[test]
fn test_cue_pot_is_scratch_foul() {
    let mut referee = referee();
    referee.record_collision("bi1");
    let events = referee.record_pot("cueball");
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert_eq!(referee.state().players[0].fouls, 1);
    assert_eq!(referee.state().current_player, 1);
}

#[test]
fn test_return_invalid_pots_policy() {
    let mut referee = referee_with(RefereeConfig::classic().rules);
    referee.record_collision("bi3");
    let pot = referee.record_pot("bi3");
    assert_eq!(pot_flags(&pot[0]), (false, false, false, true, false));
    assert!(referee.state().balls_on_table.contains(3));
}

// =============================================================================
// Fouls and rollback
// =============================================================================

#[test]
fn test_foul_reverts_this_turns_pots() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.record_pot("bi2");
    referee.record_pot("bi5");

    let events = referee.record_foul(FoulReason::CueBallScratch);
    match &events[0].kind {
        EventKind::Foul { reverted_balls, foul_count, .. } => {
            assert_eq!(reverted_balls, &vec![2, 5]);
            assert_eq!(*foul_count, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(referee.state().balls_on_table, BallSet::full_rack());
    assert!(referee.state().players[0].potted.is_empty());
    assert_eq!(referee.state().lowest_ball, 1);
}

#[test]
fn test_standing_pots_policy_keeps_balls_down() {
    let config = RuleConfig {
        policy: RulePolicy { revert_on_foul: false, ..RulePolicy::default() },
        ..RuleConfig::default()
    };
    let mut referee = referee_with(config);
    referee.record_collision("bi1");
    referee.record_pot("bi2");
    let events = referee.record_foul(FoulReason::CueBallScratch);
    assert!(matches!(&events[0].kind, EventKind::Foul { reverted_balls, .. } if reverted_balls.is_empty()));
    assert!(!referee.state().balls_on_table.contains(2));
    assert_eq!(referee.state().players[0].potted, vec![2]);
}

#[test]
fn test_foul_counter_accumulates_per_player() {
    let mut referee = referee();
    referee.record_foul(FoulReason::CueBallScratch);
    referee.record_foul(FoulReason::CueBallScratch);
    referee.record_foul(FoulReason::Other { description: "Push shot".to_string() });
    assert_eq!(referee.state().players[0].fouls, 2);
    assert_eq!(referee.state().players[1].fouls, 1);
}

#[test]
fn test_foul_without_snapshot_records_inconsistency() {
    let mut referee = referee();
    referee.snapshots.clear();
    referee.record_collision("bi1");
    referee.record_pot("bi1");

    let events = referee.record_foul(FoulReason::CueBallScratch);
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert!(matches!(
        &events[0].kind,
        EventKind::Foul { reverted_balls, foul_count: 1, .. } if reverted_balls.is_empty()
    ));
    assert!(!referee.state().balls_on_table.contains(1));

    let faults = referee.take_faults();
    assert_eq!(faults.len(), 1);
    assert!(matches!(faults[0], RefereeError::StateInconsistency(_)));
    assert!(referee.take_faults().is_empty());
}

#[test]
fn test_ball_off_table_fouls_at_turn_end() {
    let mut referee = referee();
    referee.record_collision("bi1");
    let off = referee.note_ball_off_table(BallId::Object(4));
    assert_eq!(types(&off), vec![EventType::BallOffTable]);
    assert!(referee.note_ball_off_table(BallId::Object(5)).is_empty());

    // Vanishing after leaving the table is not a pot
    let pot = referee.record_pot("bi4");
    assert_eq!(pot_flags(&pot[0]), (false, false, false, true, false));
    assert!(referee.state().balls_on_table.contains(4));

    let events = referee.finalize_turn();
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert!(matches!(
        &events[0].kind,
        EventKind::Foul { reason, .. } if reason == "bi4 left the table"
    ));
}

#[test]
fn test_off_table_outranks_wrong_ball_first() {
    let mut referee = strict();
    referee.record_collision("bi3");
    referee.note_ball_off_table(BallId::Cue);

    let events = referee.finalize_turn();
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert!(matches!(
        &events[0].kind,
        EventKind::Foul { reason, foul_count: 1, .. } if reason == "cueball left the table"
    ));
    assert_eq!(referee.state().current_player, 1);
}

fn rail_rules() -> Referee {
    let policy = RulePolicy { rail_contact_required: true, ..RulePolicy::default() };
    referee_with(RuleConfig { policy, ..RuleConfig::default() })
}

#[test]
fn test_no_rail_contact_is_a_foul_when_required() {
    let mut referee = rail_rules();
    // Before the shot: ignored
    referee.note_rail_contact(BallId::Object(5));
    referee.record_collision("bi1");

    let events = referee.finalize_turn();
    assert_eq!(types(&events), vec![EventType::Foul, EventType::TurnChange]);
    assert!(matches!(
        &events[0].kind,
        EventKind::Foul { reason, .. } if reason == "No ball reached a rail after contact"
    ));
}

#[test]
fn test_rail_contact_or_pot_satisfies_rail_rule() {
    let mut referee = rail_rules();
    referee.record_collision("bi1");
    referee.note_rail_contact(BallId::Object(1));
    assert_eq!(types(&referee.finalize_turn()), vec![EventType::TurnChange]);
    assert_eq!(referee.state().players[0].fouls, 0);

    referee.record_collision("bi1");
    referee.record_pot("bi1");
    assert_eq!(types(&referee.finalize_turn()), vec![EventType::TurnContinue]);
}

#[test]
fn test_rail_rule_off_by_default() {
    let mut referee = referee();
    referee.record_collision("bi1");
    assert_eq!(types(&referee.finalize_turn()), vec![EventType::TurnChange]);
}

// =============================================================================
// Polls
// =============================================================================

#[test]
fn test_rolling_balls_before_rest_do_not_start_a_shot() {
    let mut referee = referee();
    referee.note_motion(true, false);
    assert!(referee.check_movement_timeout(5.0).is_empty());

    referee.note_motion(false, true);
    referee.note_motion(true, false);
    assert_eq!(types(&referee.check_movement_timeout(5.0)), vec![EventType::TurnChange]);
}

#[test]
fn test_movement_timeout_needs_a_shot() {
    let mut referee = referee();
    assert!(referee.check_movement_timeout(10.0).is_empty());

    referee.note_motion(false, true);
    referee.note_motion(true, false);
    assert!(referee.check_movement_timeout(2.9).is_empty());
    let events = referee.check_movement_timeout(3.0);
    assert_eq!(types(&events), vec![EventType::TurnChange]);
    assert_eq!(referee.state().current_player, 1);

    // New turn: nothing in progress yet
    assert!(referee.check_movement_timeout(10.0).is_empty());
}

#[test]
fn test_movement_timeout_after_pot_continues() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.record_pot("bi1");
    let events = referee.check_movement_timeout(3.5);
    assert_eq!(types(&events), vec![EventType::TurnContinue]);
    assert_eq!(referee.state().current_player, 0);
    assert_eq!(referee.snapshots().len(), 2);
}

#[test]
fn test_cue_scratch_is_one_shot_until_cue_returns() {
    let mut referee = referee();
    for _ in 0..9 {
        assert!(referee.check_cue_scratch(false).is_empty());
    }
    let events = referee.check_cue_scratch(false);
    assert_eq!(
        types(&events),
        vec![EventType::CueballScratch, EventType::Foul, EventType::TurnChange]
    );
    for _ in 0..20 {
        assert!(referee.check_cue_scratch(false).is_empty());
    }

    referee.check_cue_scratch(true);
    for _ in 0..9 {
        assert!(referee.check_cue_scratch(false).is_empty());
    }
    assert_eq!(referee.check_cue_scratch(false).len(), 3);
    assert_eq!(referee.state().players[0].fouls, 1);
    assert_eq!(referee.state().players[1].fouls, 1);
}

#[test]
fn test_lowest_ball_follows_tracker() {
    let mut referee = referee();
    let mut tracker = BallPresenceTracker::new(&PresenceConfig::default()).unwrap();
    let all: Vec<BallId> = BallId::objects().collect();

    tracker.update(0, &all);
    assert_eq!(referee.update_lowest_ball(&tracker), 1);

    tracker.update(1, &all[1..]);
    assert_eq!(referee.update_lowest_ball(&tracker), 2);

    tracker.update(2, &[]);
    assert_eq!(referee.update_lowest_ball(&tracker), 2, "nothing qualifies: keep previous");
}

// =============================================================================
// Presence notifications
// =============================================================================

#[test]
fn test_reappearance_reverts_pot_from_this_turn() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.record_pot("bi4");
    assert_eq!(referee.state().players[0].potted, vec![4]);

    let events = referee.note_ball_reappeared(&Reappearance {
        ball: BallId::Object(4),
        missing_frames: 12,
        was_potted: true,
    });
    assert!(matches!(events[0].kind, EventKind::BallReappeared { pot_reverted: true, .. }));
    assert!(referee.state().balls_on_table.contains(4));
    assert!(referee.state().players[0].potted.is_empty());
    assert!(referee.state().turn.potted_this_turn.is_empty());
}

#[test]
fn test_reappearance_without_pot_only_reports() {
    let mut referee = referee();
    let before = referee.state().balls_on_table;
    let events = referee.note_ball_reappeared(&Reappearance {
        ball: BallId::Object(3),
        missing_frames: 9,
        was_potted: false,
    });
    assert!(matches!(
        events[0].kind,
        EventKind::BallReappeared { missing_frames: 9, was_potted: false, pot_reverted: false, .. }
    ));
    assert_eq!(referee.state().balls_on_table, before);
}

#[test]
fn test_ball_missing_event() {
    let mut referee = referee();
    let events = referee.note_ball_missing(BallId::Object(6));
    assert_eq!(types(&events), vec![EventType::BallMissing]);
}

// =============================================================================
// Invalid input
// =============================================================================

#[test]
fn test_malformed_ids_produce_invalid_without_mutation() {
    let mut referee = referee();
    let before = referee.game_state();
    let log_len = referee.events().len();

    for bad in ["bi12", "ball", "bi0"] {
        let events = referee.record_collision(bad);
        assert_eq!(types(&events), vec![EventType::Invalid]);
        let events = referee.record_pot(bad);
        assert_eq!(types(&events), vec![EventType::Invalid]);
    }
    assert_eq!(types(&referee.record_collision("cueball")), vec![EventType::Invalid]);

    assert_eq!(referee.game_state(), before);
    assert_eq!(referee.events().len(), log_len);
}

#[test]
fn test_game_state_view() {
    let mut referee = referee();
    referee.record_collision("bi1");
    referee.record_pot("bi1");
    referee.note_motion(true, false);

    let view = referee.game_state();
    assert_eq!(view.state, MatchPhase::Playing);
    assert_eq!(view.current_player, "Ann");
    assert_eq!(view.players[0].score, 1);
    assert!(view.players[0].is_current);
    assert_eq!(view.balls_on_table, vec![2, 3, 4, 5, 6, 7, 8, 9]);
    assert_eq!(view.lowest_ball, 2);
    assert_eq!(view.last_hit_ball, Some(1));
    assert!(view.balls_moving);

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["state"], "playing");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: snapshot → pots → foul leaves rule state equal to the
        /// snapshot, except for one extra foul on the offender.
        #[test]
        fn prop_foul_rollback_round_trip(
            pots in prop::sample::subsequence((3u8..=8).collect::<Vec<u8>>(), 0..=6)
        ) {
            let mut referee = referee();
            referee.record_collision("bi1");
            referee.record_pot("bi1");
            referee.finalize_turn();

            let snapshot = referee.snapshots().latest().unwrap().clone();

            referee.record_collision("bi2");
            for n in &pots {
                referee.record_pot(&format!("bi{}", n));
            }
            referee.record_foul(FoulReason::CueBallScratch);

            let state = referee.state();
            prop_assert_eq!(state.balls_on_table, snapshot.balls_on_table);
            prop_assert_eq!(state.lowest_ball, snapshot.lowest_ball);
            prop_assert_eq!(&state.players[0].potted, &snapshot.potted[0]);
            prop_assert_eq!(&state.players[1].potted, &snapshot.potted[1]);
            prop_assert_eq!(state.players[0].fouls, snapshot.fouls[0] + 1);
            prop_assert_eq!(state.players[1].fouls, snapshot.fouls[1]);
        }
    }
}
