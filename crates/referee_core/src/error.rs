use thiserror::Error;

use crate::referee::MatchPhase;

/// Malformed input handed to the referee. Logged and ignored, never applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Malformed ball id: {0:?}")]
    MalformedBallId(String),

    #[error("Cue ball is not a valid object ball")]
    CueNotObjectBall,

    #[error("Invalid starting player index: {0} (expected 0 or 1)")]
    InvalidStartingPlayer(usize),
}

/// Invalid threshold or policy detected at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall { field: &'static str, min: u64, value: u64 },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange { field: &'static str, min: f64, max: f64, value: f64 },

    #[error("{field} is inconsistent: {reason}")]
    Inconsistent { field: &'static str, reason: &'static str },

    #[error("Invalid configuration JSON: {0}")]
    Parse(String),
}

/// Errors raised by the referee state machine itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefereeError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Cannot {action} while {phase:?}")]
    InvalidTransition { action: &'static str, phase: MatchPhase },

    #[error("State inconsistency: {0}")]
    StateInconsistency(String),
}

/// Contract violations at the frame-engine boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Out-of-order frame: got {got}, last processed {last}")]
    OutOfOrderFrame { got: u64, last: u64 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Referee(#[from] RefereeError),
}

impl EngineError {
    /// Whether the engine can keep consuming frames after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::OutOfOrderFrame { .. } => true,
            EngineError::Referee(RefereeError::Input(_)) => true,
            EngineError::Referee(_) => false,
            EngineError::Config(_) => false,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RefereeError>;
