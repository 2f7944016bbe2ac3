//! Blocking capture loop.
//!
//! ## Per iteration
//!
//! ```text
//! 0. running flag cleared? → Stopped
//! 1. Dump request pending? → snapshot ring, run dump, publish DumpEvent, back to 1
//! 2. Drop stale stop signals
//! 3. Read one frame from the device (blocks) → write into the ring
//! ```
//!
//! Trigger polling never blocks, so the device is read at its own pace while
//! idle. During a dump the ring is not written by this loop; the dump routine
//! owns the device read path until its stop condition fires.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use chrono::{Local, SecondsFormat};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    audio::AudioSource,
    buffering::FrameRing,
    engine::{dump, RecorderConfig},
    error::Result,
    ipc::events::{DumpEvent, RecorderStatus, RecorderStatusEvent},
    trigger::TriggerReceiver,
};

#[derive(Default)]
pub struct CaptureDiagnostics {
    pub frames_captured: AtomicUsize,
    pub dumps_completed: AtomicUsize,
    pub frames_dumped: AtomicUsize,
    pub stops_discarded: AtomicUsize,
}

impl CaptureDiagnostics {
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.dumps_completed.store(0, Ordering::Relaxed);
        self.frames_dumped.store(0, Ordering::Relaxed);
        self.stops_discarded.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            dumps_completed: self.dumps_completed.load(Ordering::Relaxed),
            frames_dumped: self.frames_dumped.load(Ordering::Relaxed),
            stops_discarded: self.stops_discarded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_captured: usize,
    pub dumps_completed: usize,
    pub frames_dumped: usize,
    pub stops_discarded: usize,
}

/// All context the capture loop needs, passed as one struct so the closure
/// stays tidy.
pub struct CaptureContext<S> {
    pub config: RecorderConfig,
    pub source: S,
    pub ring: FrameRing,
    pub triggers: TriggerReceiver,
    pub running: Arc<AtomicBool>,
    pub status: Arc<Mutex<RecorderStatus>>,
    pub status_tx: broadcast::Sender<RecorderStatusEvent>,
    pub dump_tx: broadcast::Sender<DumpEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<CaptureDiagnostics>,
}

impl<S> CaptureContext<S> {
    fn set_status(&self, new_status: RecorderStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(RecorderStatusEvent {
            status: new_status,
            detail,
        });
    }
}

/// Run the capture loop until `ctx.running` is cleared or a fatal error
/// occurs. The source is dropped (device released) on return.
pub fn run<S: AudioSource>(mut ctx: CaptureContext<S>) -> Result<()> {
    info!(
        capacity_frames = ctx.ring.capacity(),
        frame_size = ctx.ring.frame_size(),
        history_secs = ctx.config.spec().duration_of(ctx.ring.capacity()).as_secs_f64(),
        "capture loop started"
    );
    ctx.set_status(RecorderStatus::Idle, None);

    let result = capture(&mut ctx);
    match &result {
        Ok(()) => {
            ctx.set_status(RecorderStatus::Stopped, None);
            info!("capture loop stopped");
        }
        Err(e) => {
            error!("capture loop failed: {e}");
            ctx.set_status(RecorderStatus::Error, Some(e.to_string()));
        }
    }
    result
}

fn capture<S: AudioSource>(ctx: &mut CaptureContext<S>) -> Result<()> {
    let mut frame = vec![0; ctx.ring.frame_size()];
    // fsync of the most recent dump; joined before a clean exit.
    let mut pending_sync: Option<JoinHandle<()>> = None;

    loop {
        // ── 0. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            if let Some(handle) = pending_sync.take() {
                let _ = handle.join();
            }
            return Ok(());
        }

        // ── 1. Service pending triggers first ─────────────────────────────
        if let Some(request) = ctx.triggers.try_dump() {
            let job = dump::DumpJob {
                triggered_at: Local::now(),
                range: ctx.ring.snapshot_range(),
                stop: request.stop_condition(),
            };
            ctx.set_status(RecorderStatus::Dumping, None);
            let outcome = dump::run(
                &ctx.config,
                &mut ctx.ring,
                &mut ctx.source,
                &ctx.triggers,
                &ctx.running,
                job,
            )?;

            let counts = outcome.counts;
            pending_sync = Some(outcome.synced);
            ctx.diagnostics.dumps_completed.fetch_add(1, Ordering::Relaxed);
            ctx.diagnostics
                .frames_dumped
                .fetch_add(counts.historical_frames + counts.live_frames, Ordering::Relaxed);
            let _ = ctx.dump_tx.send(DumpEvent {
                seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
                path: outcome.path.display().to_string(),
                triggered_at: job.triggered_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                samples: counts.samples,
                historical_frames: counts.historical_frames,
                live_frames: counts.live_frames,
                duration_secs: ctx.config.spec().duration_of_samples(counts.samples).as_secs_f64(),
            });
            ctx.set_status(RecorderStatus::Idle, None);
            continue;
        }

        // ── 2. Stop signals only mean something during a dump ─────────────
        let stale = ctx.triggers.discard_stops();
        if stale > 0 {
            debug!(count = stale, "stop ignored: no dump in progress");
            ctx.diagnostics
                .stops_discarded
                .fetch_add(stale, Ordering::Relaxed);
        }

        // ── 3. Read one frame into the ring ───────────────────────────────
        ctx.source.read_frame(&mut frame)?;
        ctx.ring.write(&frame);
        ctx.diagnostics.frames_captured.fetch_add(1, Ordering::Relaxed);
    }
}
