//! Output collaborators
//!
//! The referee decides *what* happened; how events reach clients and where
//! finished matches are stored belong to the embedding application. Both
//! seams are single-method traits and must not block: a slow client must
//! never stall frame processing.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | `MemorySink` | Collects events and summaries in memory (tests, replays) |
//! | `LogSink` | Writes every event through the `log` facade |
//! | `NullSink` | Discards everything |

use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::RefereeEvent;
use crate::referee::MatchSummary;

/// Receives every referee event, in order
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RefereeEvent);
}

/// Receives the summary of each finished match
pub trait MatchArchive: Send + Sync {
    fn store(&self, summary: MatchSummary);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &RefereeEvent) {
        (**self).emit(event)
    }
}

impl<T: MatchArchive + ?Sized> MatchArchive for Arc<T> {
    fn store(&self, summary: MatchSummary) {
        (**self).store(summary)
    }
}

// =============================================================================
// MemorySink
// =============================================================================

/// Shared in-memory event and summary store. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RefereeEvent>>>,
    summaries: Arc<Mutex<Vec<MatchSummary>>>,
}

/// Lock, taking the data back if a previous holder panicked
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("MemorySink lock poisoned, recovering");
        poisoned.into_inner()
    })
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RefereeEvent> {
        relock(&self.events).clone()
    }

    pub fn summaries(&self) -> Vec<MatchSummary> {
        relock(&self.summaries).clone()
    }

    pub fn len(&self) -> usize {
        relock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        relock(&self.events).clear();
        relock(&self.summaries).clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &RefereeEvent) {
        relock(&self.events).push(event.clone());
    }
}

impl MatchArchive for MemorySink {
    fn store(&self, summary: MatchSummary) {
        relock(&self.summaries).push(summary);
    }
}

// =============================================================================
// LogSink / NullSink
// =============================================================================

/// Writes events as JSON at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &RefereeEvent) {
        match serde_json::to_string(event) {
            Ok(json) => log::info!(target: "referee::events", "{}", json),
            Err(err) => log::warn!("unserialisable event at frame {}: {}", event.frame, err),
        }
    }
}

impl MatchArchive for LogSink {
    fn store(&self, summary: MatchSummary) {
        log::info!(
            target: "referee::archive",
            "match {} finished: {} won, {} events",
            summary.match_id,
            summary.result.winner,
            summary.events.len()
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RefereeEvent) {}
}

impl MatchArchive for NullSink {
    fn store(&self, _summary: MatchSummary) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BallId, EventKind};

    fn event(frame: u64) -> RefereeEvent {
        RefereeEvent {
            frame,
            timestamp: frame as f64 / 30.0,
            player: None,
            message: "missing".to_string(),
            kind: EventKind::BallMissing { ball: BallId::Object(2) },
        }
    }

    #[test]
    fn test_memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        handle.emit(&event(1));
        handle.emit(&event(2));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[1].frame, 2);
        sink.clear();
        assert!(handle.is_empty());
    }

    #[test]
    fn test_memory_sink_survives_poisoned_lock() {
        let sink = MemorySink::new();
        sink.emit(&event(1));

        let events = Arc::clone(&sink.events);
        let result = std::thread::spawn(move || {
            let _guard = events.lock().unwrap();
            panic!("holder panicked");
        })
        .join();
        assert!(result.is_err());
        assert!(sink.events.is_poisoned());

        sink.emit(&event(2));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[1].frame, 2);
    }

    #[test]
    fn test_sinks_usable_as_trait_objects() {
        let memory = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> =
            vec![memory.clone() as Arc<dyn EventSink>, Arc::new(LogSink), Arc::new(NullSink)];
        for sink in &sinks {
            sink.emit(&event(7));
        }
        assert_eq!(memory.len(), 1);
    }
}
