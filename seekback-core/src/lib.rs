//! # seekback-core
//!
//! Black-box audio recorder engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioSource::read_frame → capture loop → FrameRing (most recent C frames)
//!                                              │
//!                        TriggerReceiver::try_dump (non-blocking)
//!                                              │
//!                      dump: FrameRing snapshot + live frames → AIFF file
//!                                              │
//!                               broadcast::Sender<DumpEvent>
//! ```
//!
//! The capture loop owns both the device and the ring buffer; while a dump
//! runs it stops filling the ring, so the snapshot is never overwritten
//! while it is being read.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod output;
pub mod trigger;

// Convenience re-exports for downstream crates
pub use audio::AudioSource;
pub use buffering::{frame::FrameSpec, FrameRing, SnapshotRange};
pub use engine::{Recorder, RecorderConfig, RecorderTask};
pub use error::SeekbackError;
pub use ipc::events::{DumpEvent, RecorderStatus, RecorderStatusEvent};
pub use output::NameTemplate;
pub use trigger::{DumpRequest, StopCondition, TriggerReceiver, TriggerSender};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalSource;
