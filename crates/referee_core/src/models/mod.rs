pub mod ball;
pub mod detection;
pub mod events;

pub use ball::{BallId, BallSet, CUE_LABEL, NINE_BALL};
pub use detection::{merge_overlapping, Detection, DetectionFrame};
pub use events::{EventKind, EventType, RefereeEvent};
