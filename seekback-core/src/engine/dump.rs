//! Dump routine: ring buffer snapshot + live continuation → one AIFF file.
//!
//! ## Steps
//!
//! ```text
//! 1. Render the output path from the trigger timestamp
//! 2. Create the file, write the header with placeholder sizes
//! 3. Stream the snapshot frames (oldest first, wrapping)
//! 4. Stream live frames until the stop condition holds (checked per frame)
//! 5. Patch the size fields and flush
//! 6. Point the latest-recording link at the new file
//! 7. fsync on a helper thread
//! ```
//!
//! Every I/O failure in steps 2–5 is returned to the capture loop, which
//! treats it as fatal. The fsync runs off the capture thread so a slow disk
//! cannot stall device reads; its failure is logged.
//!
//! A container stops growing at [`MAX_SAMPLES`](crate::output::aiff::MAX_SAMPLES);
//! an open-ended dump that reaches it is finalized as if it had been stopped.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::{
    audio::AudioSource,
    buffering::{FrameRing, SnapshotRange},
    engine::RecorderConfig,
    error::{Result, SeekbackError},
    output::{latest::update_latest_link, AiffWriter},
    trigger::{StopCondition, TriggerReceiver},
};

/// One triggered dump.
#[derive(Debug, Clone, Copy)]
pub struct DumpJob {
    pub triggered_at: DateTime<Local>,
    /// Ring buffer span valid at trigger time; `None` if nothing was captured.
    pub range: Option<SnapshotRange>,
    pub stop: StopCondition,
}

/// Frame and sample totals of a finished container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DumpCounts {
    pub historical_frames: usize,
    pub live_frames: usize,
    pub samples: u64,
}

/// Result of a completed dump.
#[derive(Debug)]
pub struct DumpOutcome {
    pub path: PathBuf,
    pub counts: DumpCounts,
    /// Background fsync of the finished file.
    pub synced: JoinHandle<()>,
}

/// Decides when the live phase ends. Polled once before every live frame.
pub struct LiveStop<'a> {
    condition: StopCondition,
    started: Instant,
    triggers: &'a TriggerReceiver,
    running: &'a AtomicBool,
}

impl<'a> LiveStop<'a> {
    pub fn new(condition: StopCondition, triggers: &'a TriggerReceiver, running: &'a AtomicBool) -> Self {
        Self {
            condition,
            started: Instant::now(),
            triggers,
            running,
        }
    }

    /// `true` once a shutdown was requested, a stop signal arrived, or the
    /// requested window has elapsed.
    pub fn reached(&self) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            debug!("shutdown requested during dump");
            return true;
        }
        if self.triggers.take_stop() {
            debug!("stop signal received");
            return true;
        }
        match self.condition {
            StopCondition::Elapsed(window) => self.started.elapsed() >= window,
            StopCondition::Signal => false,
        }
    }
}

/// Run one dump end to end and write the file named by the config template.
pub fn run<S: AudioSource + ?Sized>(
    config: &RecorderConfig,
    ring: &mut FrameRing,
    source: &mut S,
    triggers: &TriggerReceiver,
    running: &AtomicBool,
    job: DumpJob,
) -> Result<DumpOutcome> {
    let (file, path) = create_unique(&config.name_template.render(&job.triggered_at))?;
    info!(
        path = %path.display(),
        historical_frames = job.range.map_or(0, |r| r.len),
        stop = ?job.stop,
        "start dump"
    );

    let stop = LiveStop::new(job.stop, triggers, running);
    let (writer, counts) = write_container(
        BufWriter::new(file),
        &path,
        config.sample_rate,
        ring,
        job.range,
        source,
        &stop,
        config.retain_dump_audio,
    )?;
    let file = writer
        .into_inner()
        .map_err(|e| SeekbackError::output("flush", &path, e.into_error()))?;

    info!(
        path = %path.display(),
        samples = counts.samples,
        live_frames = counts.live_frames,
        "Dump complete. Saved to {}",
        path.display()
    );

    if let Some(link) = &config.latest_link {
        if let Err(e) = update_latest_link(link, &path) {
            warn!(link = %link.display(), "failed to update latest recording link: {e}");
        }
    }

    let synced = spawn_sync(file, path.clone());
    Ok(DumpOutcome {
        path,
        counts,
        synced,
    })
}

fn spawn_sync(file: File, path: PathBuf) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = file.sync_all() {
            warn!(path = %path.display(), "failed to sync recording to disk: {e}");
        }
    })
}

/// Create `path`, or `stem-N.ext` for the first free N when two dumps
/// render the same timestamp.
fn create_unique(path: &Path) -> Result<(File, PathBuf)> {
    let mut candidate = path.to_path_buf();
    let mut n = 0u32;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                n += 1;
                candidate = numbered_path(path, n);
            }
            Err(e) => return Err(SeekbackError::output("create", &candidate, e)),
        }
    }
}

fn numbered_path(path: &Path, n: u32) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{n}"),
    };
    path.with_file_name(name)
}

/// Encode the snapshot followed by live frames into `out`.
///
/// `path` only labels errors. With `retain_live`, every live frame is also
/// written into `ring` once the snapshot has been fully streamed.
#[allow(clippy::too_many_arguments)]
pub fn write_container<W, S>(
    out: W,
    path: &Path,
    sample_rate: u32,
    ring: &mut FrameRing,
    range: Option<SnapshotRange>,
    source: &mut S,
    stop: &LiveStop<'_>,
    retain_live: bool,
) -> Result<(W, DumpCounts)>
where
    W: Write + Seek,
    S: AudioSource + ?Sized,
{
    let mut writer = AiffWriter::new(out, sample_rate)
        .map_err(|e| SeekbackError::output("write header to", path, e))?;
    let mut counts = DumpCounts::default();

    if let Some(range) = range {
        for frame in ring.frames(range) {
            if !writer.fits(frame.len()) {
                warn!(path = %path.display(), "recording reached the container size limit");
                break;
            }
            writer
                .write_samples(frame)
                .map_err(|e| SeekbackError::output("write to", path, e))?;
            counts.historical_frames += 1;
        }
    }
    debug!(frames = counts.historical_frames, "historical audio written");

    let mut frame = vec![0; ring.frame_size()];
    loop {
        if !writer.fits(frame.len()) {
            warn!(
                path = %path.display(),
                samples = writer.sample_count(),
                "recording reached the container size limit, finishing dump"
            );
            break;
        }
        if stop.reached() {
            break;
        }
        source.read_frame(&mut frame)?;
        writer
            .write_samples(&frame)
            .map_err(|e| SeekbackError::output("write to", path, e))?;
        if retain_live {
            ring.write(&frame);
        }
        counts.live_frames += 1;
    }

    counts.samples = writer.sample_count();
    let out = writer
        .finalize()
        .map_err(|e| SeekbackError::output("finalize", path, e))?;
    Ok((out, counts))
}
