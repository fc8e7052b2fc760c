//! Event sink backed by a bounded tokio channel.
//!
//! `emit` never waits: when the receiver lags and the channel is full the
//! event is dropped with a warning. Frame processing must not stall on a
//! slow client.

use referee_core::{EventSink, RefereeEvent};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RefereeEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RefereeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &RefereeEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!(
                    "Event channel full, dropping {:?} at frame {}",
                    event.event_type(),
                    event.frame
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Event receiver gone, dropping event");
            }
        }
    }
}
