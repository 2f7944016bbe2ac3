//! Seekback command-line recorder entry point.
//!
//! ## Runtime note
//!
//! The capture loop runs on a `spawn_blocking` thread owned by
//! `seekback_core::Recorder`; the async side only listens for signals,
//! forwards dump events, and waits for the loop to finish.

mod cli;
mod notify;
mod settings;
mod triggers;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use seekback_core::{
    audio::device::list_input_devices,
    output::aiff::AiffHeader,
    trigger, Recorder,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use cli::{init_logging, Args};
use settings::{load_settings, resolve, FileSettings};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    if let Err(e) = run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    if args.list_devices {
        for device in list_input_devices() {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{marker}", device.name);
        }
        return Ok(());
    }
    if let Some(path) = &args.inspect {
        return inspect(path);
    }

    let file = match &args.config {
        Some(path) => load_settings(path)?,
        None => FileSettings::default(),
    };
    let settings = resolve(&args, file).context("invalid configuration")?;
    info!(
        buffer_frames = settings.recorder.capacity_frames,
        history_secs = settings
            .recorder
            .spec()
            .duration_of(settings.recorder.capacity_frames)
            .as_secs_f64(),
        template = %settings.recorder.name_template,
        "configuration loaded"
    );

    let recorder = Recorder::new(settings.recorder.clone())?;
    let (trigger_tx, trigger_rx) = trigger::channel();
    let dumps = recorder.subscribe_dumps();
    let task = recorder
        .start(trigger_rx)
        .context("failed to start audio capture")?;

    if let Err(e) = notify::notify("READY=1") {
        warn!("readiness notification failed: {e}");
    }

    if settings.trigger.uses_stdin() {
        triggers::spawn_stdin_reader(trigger_tx.clone(), settings.line_duration);
    }
    if settings.trigger.uses_signals() {
        triggers::spawn_signal_listener(trigger_tx.clone())
            .context("failed to install trigger signal handlers")?;
    }
    drop(trigger_tx);
    info!(trigger = ?settings.trigger, "recording; waiting for triggers");

    let forwarder = tokio::spawn(forward_dump_events(dumps, settings.json_events));

    let wait = task.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        res = &mut wait => res,
        () = shutdown_signal() => {
            info!("shutdown requested");
            if let Err(e) = notify::notify("STOPPING=1") {
                warn!("stopping notification failed: {e}");
            }
            let _ = recorder.stop();
            wait.await
        }
    };
    forwarder.abort();

    let diag = recorder.diagnostics_snapshot();
    info!(
        frames_captured = diag.frames_captured,
        dumps = diag.dumps_completed,
        frames_dumped = diag.frames_dumped,
        "session summary"
    );
    result.context("recording failed")
}

/// Mirror dump events to stdout as JSON lines when requested.
async fn forward_dump_events(
    mut dumps: tokio::sync::broadcast::Receiver<seekback_core::DumpEvent>,
    json: bool,
) {
    loop {
        match dumps.recv().await {
            Ok(event) => {
                if !json {
                    continue;
                }
                match event.to_json_line() {
                    Ok(line) => {
                        let stdout = std::io::stdout();
                        let mut handle = stdout.lock();
                        // stdout may be a closed pipe
                        let _ = writeln!(handle, "{line}");
                        let _ = handle.flush();
                    }
                    Err(e) => warn!("failed to serialize dump event: {e}"),
                }
            }
            Err(RecvError::Lagged(n)) => warn!("dropped {n} dump events"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let len = file.metadata()?.len();
    let header = AiffHeader::read_from(&mut file)
        .with_context(|| format!("failed to read header of {}", path.display()))?;

    println!("file:            {}", path.display());
    println!("channels:        {}", header.channels);
    println!("bits per sample: {}", header.bits_per_sample);
    println!("sample rate:     {} Hz", header.sample_rate);
    println!("sample frames:   {}", header.sample_frames);
    if header.sample_rate > 0.0 {
        println!(
            "duration:        {:.3} s",
            header.sample_frames as f64 / header.sample_rate
        );
    }

    header
        .check_consistency(len)
        .with_context(|| format!("{} is inconsistent", path.display()))?;
    println!("consistent:      yes ({len} bytes)");
    Ok(())
}
