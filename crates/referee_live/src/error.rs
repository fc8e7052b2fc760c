use referee_core::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Session closed")]
    SessionClosed,

    #[error("Frame queue full, frame {frame_index} dropped")]
    QueueFull { frame_index: u64 },

    #[error("Engine lock poisoned")]
    EnginePoisoned,

    #[error("Session task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl LiveError {
    /// Whether the producer can keep sending
    pub fn is_recoverable(&self) -> bool {
        match self {
            LiveError::QueueFull { .. } => true,
            LiveError::Engine(err) => err.is_recoverable(),
            LiveError::SessionClosed | LiveError::EnginePoisoned | LiveError::Join(_) => false,
        }
    }
}
