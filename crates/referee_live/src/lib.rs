//! # referee_live - Live Frame Intake for the 9-Ball Referee
//!
//! Wraps a [`referee_core::RefereeEngine`] in a single-consumer tokio task fed
//! by a bounded frame queue.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use referee_core::{LogSink, RefereeConfig, RefereeEngine};
//! use referee_live::{spawn_session, ChannelSink, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (events, mut rx) = ChannelSink::new(256);
//!     let mut engine = RefereeEngine::new(
//!         RefereeConfig::from_env_or_default(),
//!         Arc::new(events),
//!         Arc::new(LogSink),
//!     )?;
//!     engine.start("Ann", "Bob", 0)?;
//!
//!     let (frames, session) = spawn_session(engine, SessionConfig::default());
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             println!("{}", event.message);
//!         }
//!     });
//!
//!     // capture loop: frames.send(frame).await?;
//!     drop(frames);
//!     let report = session.join().await?;
//!     println!("{} frames refereed", report.frames_processed);
//!     Ok(())
//! }
//! ```

pub mod channel_sink;
pub mod error;
pub mod session;

pub use channel_sink::ChannelSink;
pub use error::LiveError;
pub use session::{
    spawn_session, FrameSender, SessionConfig, SessionHandle, SessionReport, StopReason,
};
