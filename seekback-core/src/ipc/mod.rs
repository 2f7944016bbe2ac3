//! Event types broadcast to recorder subscribers.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so the app can
//! forward them as JSON lines.

pub mod events;
