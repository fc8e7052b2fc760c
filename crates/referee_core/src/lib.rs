//! # referee_core - Deterministic 9-Ball Referee
//!
//! Turns per-frame ball detections from an external vision model into
//! authoritative game decisions: first contacts, pots, fouls, turn changes
//! and the winner.
//!
//! ## Features
//! - Occlusion-tolerant pot confirmation (two-phase missing → potted)
//! - Cue/object-ball contact detection with look-ahead for vanished balls
//! - Turn rollback on fouls from a bounded snapshot ring
//! - Rule revisions as explicit policy flags
//! - Same frames in, same decisions out: no wall-clock reads in the rules
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use referee_core::{RefereeConfig, RefereeEngine, MemorySink};
//!
//! let sink = MemorySink::new();
//! let mut engine = RefereeEngine::new(
//!     RefereeConfig::from_env_or_default(),
//!     Arc::new(sink.clone()),
//!     Arc::new(sink.clone()),
//! )
//! .unwrap();
//! engine.start("Ann", "Bob", 0).unwrap();
//!
//! let frame = serde_json::from_str(
//!     r#"{"frame_idx": 0, "balls": [{"name": "cueball", "x": 120.0, "y": 300.0, "r": 11.0, "conf": 0.97}]}"#,
//! )
//! .unwrap();
//! let report = engine.process_frame(&frame).unwrap();
//! assert!(report.events.is_empty());
//! assert_eq!(sink.len(), 1); // game_start
//! ```

pub mod collision;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod models;
pub mod motion;
pub mod presence;
pub mod referee;
pub mod sink;

pub use collision::{detect_collisions, CollisionDetector, CollisionEvent};
pub use config::{BreakGrace, RefereeConfig, RulePolicy};
pub use engine::{FrameReport, RefereeEngine};
pub use error::{ConfigError, EngineError, InputError, RefereeError, Result};
pub use models::{BallId, BallSet, Detection, DetectionFrame, EventKind, EventType, RefereeEvent};
pub use presence::{BallPresenceTracker, PresenceState, PresenceUpdate, Reappearance};
pub use referee::{FoulReason, GameStateView, MatchPhase, MatchSummary, Referee};
pub use sink::{EventSink, LogSink, MatchArchive, MemorySink, NullSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
