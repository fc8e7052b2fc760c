//! Live frame intake
//!
//! Producers push detector frames into a bounded channel; a single consumer
//! task owns the write side of the engine and applies frames one at a time.
//!
//! ```text
//!  capture ──► FrameSender ──[bounded mpsc]──► consumer task ──► RefereeEngine
//!                                                   ▲
//!  SessionHandle::stop ──[watch]────────────────────┘ (checked between frames)
//! ```
//!
//! On stop or when every sender is dropped the consumer flushes the collision
//! detector and returns a `SessionReport`. A frame is taken off the channel
//! exactly once, so no frame is ever processed twice.

use std::sync::{Arc, Mutex};

use referee_core::{DetectionFrame, GameStateView, RefereeEngine, RefereeEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::LiveError;

/// Session tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Frames buffered between producers and the consumer
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Why the consumer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `SessionHandle::stop` was called (or the handle dropped)
    Signal,
    /// Every `FrameSender` was dropped
    InputClosed,
    /// The engine reported an error it cannot continue from
    EngineFailure,
}

/// Returned by the consumer when it exits
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub frames_processed: u64,
    /// Frames refused by the engine (out of order)
    pub frames_rejected: u64,
    pub last_frame: Option<u64>,
    /// Events emitted while processing frames
    pub events_emitted: usize,
    /// Events produced by the final flush
    pub flushed_events: Vec<RefereeEvent>,
    pub stopped_by: StopReason,
}

/// Producer side; cheap to clone
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<DetectionFrame>,
}

impl FrameSender {
    /// Wait for queue space
    pub async fn send(&self, frame: DetectionFrame) -> Result<(), LiveError> {
        self.tx.send(frame).await.map_err(|_| LiveError::SessionClosed)
    }

    /// Enqueue without waiting; a full queue is an error, the frame is dropped
    pub fn try_send(&self, frame: DetectionFrame) -> Result<(), LiveError> {
        self.tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(frame) => {
                LiveError::QueueFull { frame_index: frame.frame_index }
            }
            mpsc::error::TrySendError::Closed(_) => LiveError::SessionClosed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Control side of a running session
pub struct SessionHandle {
    stop_tx: watch::Sender<bool>,
    engine: Arc<Mutex<RefereeEngine>>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Ask the consumer to stop at the next frame boundary
    pub fn stop(&self) {
        // Err only when the consumer already exited
        let _ = self.stop_tx.send(true);
    }

    /// Shared engine, for queries and match control between frames
    pub fn engine(&self) -> Arc<Mutex<RefereeEngine>> {
        Arc::clone(&self.engine)
    }

    pub fn game_state(&self) -> Result<GameStateView, LiveError> {
        let engine = self.engine.lock().map_err(|_| LiveError::EnginePoisoned)?;
        Ok(engine.game_state())
    }

    /// Wait for the consumer to finish
    pub async fn join(self) -> Result<SessionReport, LiveError> {
        // The stop sender must outlive the task: dropping it reads as a stop
        let SessionHandle { stop_tx, engine: _engine, task } = self;
        let result = task.await.map_err(|err| LiveError::Join(err.to_string()));
        drop(stop_tx);
        result
    }

    /// Stop, then wait for the report
    pub async fn shutdown(self) -> Result<SessionReport, LiveError> {
        self.stop();
        self.join().await
    }
}

/// Start a consumer task for `engine`. Must be called inside a tokio runtime.
pub fn spawn_session(engine: RefereeEngine, config: SessionConfig) -> (FrameSender, SessionHandle) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);
    let engine = Arc::new(Mutex::new(engine));

    let task = tokio::spawn(consume(Arc::clone(&engine), rx, stop_rx));
    (FrameSender { tx }, SessionHandle { stop_tx, engine, task })
}

async fn consume(
    engine: Arc<Mutex<RefereeEngine>>,
    mut frames: mpsc::Receiver<DetectionFrame>,
    mut stop: watch::Receiver<bool>,
) -> SessionReport {
    let mut report = SessionReport {
        frames_processed: 0,
        frames_rejected: 0,
        last_frame: None,
        events_emitted: 0,
        flushed_events: Vec::new(),
        stopped_by: StopReason::InputClosed,
    };

    log::info!("Referee session started");

    loop {
        if *stop.borrow() {
            report.stopped_by = StopReason::Signal;
            break;
        }

        let frame = tokio::select! {
            biased;
            changed = stop.changed() => {
                // A dropped handle counts as a stop request
                if changed.is_err() || *stop.borrow() {
                    report.stopped_by = StopReason::Signal;
                    break;
                }
                continue;
            }
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => {
                    report.stopped_by = StopReason::InputClosed;
                    break;
                }
            },
        };

        let mut guard = match engine.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Engine lock poisoned, stopping session");
                report.stopped_by = StopReason::EngineFailure;
                break;
            }
        };
        match guard.process_frame(&frame) {
            Ok(frame_report) => {
                report.frames_processed += 1;
                report.last_frame = Some(frame_report.frame_index);
                report.events_emitted += frame_report.events.len();
            }
            Err(err) if err.is_recoverable() => {
                log::warn!("Frame {} rejected: {}", frame.frame_index, err);
                report.frames_rejected += 1;
            }
            Err(err) => {
                log::error!("Frame {} failed: {}", frame.frame_index, err);
                report.stopped_by = StopReason::EngineFailure;
                break;
            }
        }
    }

    // Closing the queue makes further sends fail fast
    frames.close();
    match engine.lock() {
        Ok(mut guard) => report.flushed_events = guard.finish(),
        Err(_) => log::error!("Engine lock poisoned, final flush skipped"),
    }

    log::info!(
        "Referee session ended ({:?}): {} frames, {} rejected",
        report.stopped_by,
        report.frames_processed,
        report.frames_rejected
    );
    report
}
