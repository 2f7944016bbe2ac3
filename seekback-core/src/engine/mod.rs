//! `Recorder`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Recorder::new(config)       → config validated, ring not yet allocated
//!     └─► start(triggers)     → device open, capture thread spawned, status = Idle
//!         └─► stop()          → running=false, loop finishes any dump, status = Stopped
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! The audio source is therefore opened *inside* the `spawn_blocking` closure so
//! it never crosses a thread boundary. A sync oneshot channel propagates any
//! open-device errors back to the `start()` caller.

pub mod capture;
pub mod dump;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    audio::AudioSource,
    buffering::{frame::FrameSpec, FrameRing},
    error::{Result, SeekbackError},
    ipc::events::{DumpEvent, RecorderStatus, RecorderStatusEvent},
    output::NameTemplate,
    trigger::TriggerReceiver,
};

/// Broadcast channel capacity for status and dump events.
const BROADCAST_CAP: usize = 64;

/// Largest accepted frame size (samples per device read).
const MAX_FRAME_SIZE: usize = 1 << 16;

/// Configuration for `Recorder`.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Ring buffer capacity in frames. Default: 200 000 (≈ 4.8 min at 64/44.1 kHz).
    pub capacity_frames: usize,
    /// Samples per device read. Default: 64.
    pub frame_size: usize,
    /// Capture rate in Hz. Default: 44 100.
    pub sample_rate: u32,
    /// Output file name template. Default: `seekback-%s.aiff`.
    pub name_template: NameTemplate,
    /// Symlink re-pointed at every finished dump.
    pub latest_link: Option<PathBuf>,
    /// Feed frames captured during a dump back into the ring buffer so the
    /// next trigger sees them as history. Default: false.
    pub retain_dump_audio: bool,
    /// Input device name; `None` selects the system default.
    pub preferred_device: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity_frames: 200_000,
            frame_size: 64,
            sample_rate: 44_100,
            name_template: NameTemplate::default(),
            latest_link: None,
            retain_dump_audio: false,
            preferred_device: None,
        }
    }
}

impl RecorderConfig {
    pub fn spec(&self) -> FrameSpec {
        FrameSpec::new(self.frame_size, self.sample_rate)
    }

    /// Reject configurations the capture loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity_frames == 0 {
            return Err(SeekbackError::Config(
                "buffer size must be at least one frame".into(),
            ));
        }
        if self.frame_size == 0 || self.frame_size > MAX_FRAME_SIZE {
            return Err(SeekbackError::Config(format!(
                "frame size must be between 1 and {MAX_FRAME_SIZE} samples, got {}",
                self.frame_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(SeekbackError::Config("sample rate must be positive".into()));
        }
        if self.capacity_frames.checked_mul(self.frame_size).is_none() {
            return Err(SeekbackError::Config(format!(
                "buffer of {} frames is too large",
                self.capacity_frames
            )));
        }
        Ok(())
    }
}

/// Handle to the spawned capture thread.
pub struct RecorderTask {
    handle: JoinHandle<Result<()>>,
}

impl RecorderTask {
    /// Wait for the capture loop to finish and return its result.
    pub async fn wait(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SeekbackError::Other(anyhow::anyhow!(
                "capture task died unexpectedly: {e}"
            ))),
        }
    }
}

/// The top-level recorder handle.
///
/// `Recorder` is `Send + Sync`; all fields use interior mutability.
pub struct Recorder {
    config: RecorderConfig,
    /// `true` while the capture loop is active.
    running: Arc<AtomicBool>,
    /// Canonical status (written atomically via Mutex, read from callers).
    status: Arc<Mutex<RecorderStatus>>,
    status_tx: broadcast::Sender<RecorderStatusEvent>,
    dump_tx: broadcast::Sender<DumpEvent>,
    /// Monotonically increasing dump event sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<capture::CaptureDiagnostics>,
}

impl Recorder {
    /// Validate `config` and create a recorder. Does not open the device.
    pub fn new(config: RecorderConfig) -> Result<Self> {
        config.validate()?;
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (dump_tx, _) = broadcast::channel(BROADCAST_CAP);

        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(RecorderStatus::Stopped)),
            status_tx,
            dump_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(capture::CaptureDiagnostics::default()),
        })
    }

    /// Open the configured cpal input device and start capturing.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "audio-cpal")]
    pub fn start(&self, triggers: TriggerReceiver) -> Result<RecorderTask> {
        let preferred = self.config.preferred_device.clone();
        let spec = self.config.spec();
        self.start_with(triggers, move || {
            crate::audio::CpalSource::open(preferred.as_deref(), spec)
        })
    }

    /// Start capturing from the source returned by `open`.
    ///
    /// `open` runs on the capture thread. Blocks until it returns, so device
    /// errors surface here rather than from the task.
    ///
    /// # Errors
    /// - `SeekbackError::AlreadyRunning` if already started.
    /// - Whatever `open` returns, or `Config` if the source's frame geometry
    ///   differs from the configuration.
    pub fn start_with<S, F>(&self, triggers: TriggerReceiver, open: F) -> Result<RecorderTask>
    where
        S: AudioSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SeekbackError::AlreadyRunning);
        }
        self.diagnostics.reset();

        let ring = match FrameRing::new(self.config.capacity_frames, self.config.frame_size) {
            Ok(ring) => ring,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        // Clone all Arc-wrapped state before moving into the closure.
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let status_tx = self.status_tx.clone();
        let dump_tx = self.dump_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Sync oneshot: capture thread signals open success/failure to start_with().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        let handle = tokio::task::spawn_blocking(move || {
            // ── Open the source on THIS thread (cpal::Stream is !Send) ──
            let source = match open().and_then(|s| check_spec(s, config.spec())) {
                Ok(s) => {
                    let _ = open_tx.send(Ok(()));
                    s
                }
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    let _ = open_tx.send(Err(e));
                    return Ok(());
                }
            };

            let result = capture::run(capture::CaptureContext {
                config,
                source,
                ring,
                triggers,
                running: Arc::clone(&running),
                status,
                status_tx,
                dump_tx,
                seq,
                diagnostics,
            });
            running.store(false, Ordering::SeqCst);
            result
        });

        // Block until the source is confirmed open.
        match open_rx.recv() {
            Ok(Ok(())) => {
                info!("recorder started");
                Ok(RecorderTask { handle })
            }
            Ok(Err(e)) => {
                self.set_status(RecorderStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the open closure panicked.
                self.running.store(false, Ordering::SeqCst);
                self.set_status(RecorderStatus::Error, Some("capture failed to start".into()));
                Err(SeekbackError::Other(anyhow::anyhow!(
                    "capture task died unexpectedly"
                )))
            }
        }
    }

    /// Ask the capture loop to stop. An in-progress dump is finalized first.
    ///
    /// # Errors
    /// - `SeekbackError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(SeekbackError::NotRunning);
        }
        info!("recorder stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current recorder status (snapshot).
    pub fn status(&self) -> RecorderStatus {
        *self.status.lock()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<RecorderStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to completed dump events.
    pub fn subscribe_dumps(&self) -> broadcast::Receiver<DumpEvent> {
        self.dump_tx.subscribe()
    }

    /// Snapshot of capture counters for observability.
    pub fn diagnostics_snapshot(&self) -> capture::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: RecorderStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(RecorderStatusEvent {
            status: new_status,
            detail,
        });
    }
}

fn check_spec<S: AudioSource>(source: S, expected: FrameSpec) -> Result<S> {
    let actual = source.spec();
    if actual != expected {
        return Err(SeekbackError::Config(format!(
            "audio source delivers {} samples at {} Hz, configured for {} at {} Hz",
            actual.frame_size, actual.sample_rate, expected.frame_size, expected.sample_rate
        )));
    }
    Ok(source)
}
