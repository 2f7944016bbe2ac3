//! Event types published by the recorder.
//!
//! Both event kinds go out on `tokio::sync::broadcast` channels
//! (`Recorder::subscribe_status`, `Recorder::subscribe_dumps`); the app can
//! mirror dump events to stdout as JSON lines.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Dump events
// ---------------------------------------------------------------------------

/// Emitted once per completed dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Path of the written container.
    pub path: String,
    /// RFC 3339 timestamp of the trigger.
    pub triggered_at: String,
    /// Total samples in the container.
    pub samples: u64,
    /// Frames taken from the ring buffer.
    pub historical_frames: usize,
    /// Frames read live after the trigger.
    pub live_frames: usize,
    /// Audio length in seconds.
    pub duration_secs: f64,
}

impl DumpEvent {
    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Recorder status events
// ---------------------------------------------------------------------------

/// Emitted when the recorder state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatusEvent {
    pub status: RecorderStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    /// Filling the ring buffer.
    Idle,
    /// Writing a dump.
    Dumping,
    /// Device released after a shutdown request.
    Stopped,
    /// Fatal device or output error.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_event_serializes_with_camel_case() {
        let event = DumpEvent {
            seq: 4,
            path: "seekback-2024-01-01T00:00:00Z.aiff".into(),
            triggered_at: "2024-01-01T00:00:00Z".into(),
            samples: 640,
            historical_frames: 8,
            live_frames: 2,
            duration_secs: 0.5,
        };

        let json = serde_json::to_value(&event).expect("serialize dump event");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["historicalFrames"], 8);
        assert_eq!(json["liveFrames"], 2);
        assert_eq!(json["triggeredAt"], "2024-01-01T00:00:00Z");

        let line = event.to_json_line().expect("json line");
        assert!(!line.contains('\n'));
        let round_trip: DumpEvent = serde_json::from_str(&line).expect("deserialize dump event");
        assert_eq!(round_trip.samples, 640);
        assert_eq!(round_trip.path, event.path);
    }

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = RecorderStatusEvent {
            status: RecorderStatus::Dumping,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "dumping");

        let err = serde_json::from_str::<RecorderStatus>(r#""Dumping""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
