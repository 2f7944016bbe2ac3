use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by seekback-core.
#[derive(Debug, Error)]
pub enum SeekbackError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("audio input overrun: {dropped} samples lost before they could be read")]
    Overrun { dropped: usize },

    #[error("failed to {op} {}: {source}", path.display())]
    Output {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recorder is already running")]
    AlreadyRunning,

    #[error("recorder is not running")]
    NotRunning,

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SeekbackError {
    /// Wrap an I/O failure on an output file with the operation that failed.
    pub fn output(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SeekbackError>;
