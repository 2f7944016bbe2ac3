//! Command-line interface.
//!
//! Every recorder option is optional here so a settings file can supply it;
//! `settings::resolve` layers defaults, the file, then these flags.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Seekback - keep the last few minutes of audio and save them on demand
#[derive(Parser, Debug, Default)]
#[command(name = "seekback")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Frames of audio kept before a dump (at 64 samples / 44.1 kHz, ~690 frames = 1 second)
    #[arg(long = "buffer-size", value_name = "FRAMES")]
    pub buffer_size: Option<usize>,

    /// File name template for recordings; must contain exactly one %s (the trigger time)
    #[arg(long = "name", value_name = "TEMPLATE")]
    pub name: Option<String>,

    /// Symlink updated to point at the most recent recording
    #[arg(long, value_name = "PATH")]
    pub latest: Option<PathBuf>,

    /// Samples per device read
    #[arg(long, value_name = "SAMPLES")]
    pub frame_size: Option<usize>,

    /// Capture sample rate in Hz
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Input device name (default: system default input)
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Where dump triggers come from
    #[arg(long, value_enum)]
    pub trigger: Option<TriggerMode>,

    /// Seconds of live audio captured after a stdin trigger
    #[arg(long, value_name = "SECS")]
    pub line_duration: Option<f64>,

    /// Keep audio captured during a dump as history for the next trigger
    #[arg(long)]
    pub retain_dump_audio: bool,

    /// Print one JSON line per finished dump on stdout
    #[arg(long)]
    pub json_events: bool,

    /// JSON settings file (command-line flags take precedence)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Print the header of a recording and check it for consistency, then exit
    #[arg(long, value_name = "FILE")]
    pub inspect: Option<PathBuf>,

    /// Increase logging verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Trigger sources to listen on.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Each stdin line dumps (a number sets the live seconds, `stop` ends an open dump)
    #[default]
    Stdin,
    /// SIGUSR1 starts an open-ended dump, SIGUSR2 stops it
    Signal,
    /// Both of the above
    Both,
}

impl TriggerMode {
    pub fn uses_stdin(self) -> bool {
        matches!(self, Self::Stdin | Self::Both)
    }

    pub fn uses_signals(self) -> bool {
        matches!(self, Self::Signal | Self::Both)
    }
}

impl Args {
    /// Filter used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

/// Initialize tracing on stderr (stdout carries JSON events).
pub fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}
