//! Optional JSON settings file and final configuration resolution.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use seekback_core::{NameTemplate, RecorderConfig};
use serde::{Deserialize, Serialize};

use crate::cli::{Args, TriggerMode};

/// Live seconds captured after a stdin trigger unless overridden.
const DEFAULT_LINE_DURATION_SECS: f64 = 2.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub buffer_size: Option<usize>,
    pub name: Option<String>,
    pub latest: Option<PathBuf>,
    pub frame_size: Option<usize>,
    pub sample_rate: Option<u32>,
    pub device: Option<String>,
    pub trigger: Option<TriggerMode>,
    pub line_duration_secs: Option<f64>,
    pub retain_dump_audio: Option<bool>,
    pub json_events: Option<bool>,
}

/// Everything `main` needs to run a session.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub recorder: RecorderConfig,
    pub trigger: TriggerMode,
    pub line_duration: Duration,
    pub json_events: bool,
}

pub fn load_settings(path: &Path) -> anyhow::Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))
}

/// Layer defaults, the settings file and command-line flags (highest wins).
pub fn resolve(args: &Args, file: FileSettings) -> anyhow::Result<RunSettings> {
    let mut recorder = RecorderConfig::default();

    if let Some(frames) = args.buffer_size.or(file.buffer_size) {
        recorder.capacity_frames = frames;
    }
    if let Some(template) = args.name.as_ref().or(file.name.as_ref()) {
        recorder.name_template = NameTemplate::parse(template)?;
    }
    recorder.latest_link = args.latest.clone().or(file.latest);
    if let Some(frame_size) = args.frame_size.or(file.frame_size) {
        recorder.frame_size = frame_size;
    }
    if let Some(rate) = args.sample_rate.or(file.sample_rate) {
        recorder.sample_rate = rate;
    }
    recorder.preferred_device = args
        .device
        .clone()
        .or(file.device)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    recorder.retain_dump_audio = args.retain_dump_audio || file.retain_dump_audio.unwrap_or(false);
    recorder.validate()?;

    let secs = args
        .line_duration
        .or(file.line_duration_secs)
        .unwrap_or(DEFAULT_LINE_DURATION_SECS);
    if !secs.is_finite() || secs < 0.0 {
        bail!("line duration must be a non-negative number of seconds, got {secs}");
    }
    let line_duration = Duration::try_from_secs_f64(secs)
        .with_context(|| format!("line duration {secs}s is out of range"))?;

    Ok(RunSettings {
        recorder,
        trigger: args.trigger.or(file.trigger).unwrap_or_default(),
        line_duration,
        json_events: args.json_events || file.json_events.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file_or_flags() {
        let run = resolve(&Args::default(), FileSettings::default()).unwrap();
        assert_eq!(run.recorder.capacity_frames, 200_000);
        assert_eq!(run.recorder.name_template.to_string(), "seekback-%s.aiff");
        assert_eq!(run.trigger, TriggerMode::Stdin);
        assert_eq!(run.line_duration, Duration::from_secs(2));
        assert!(!run.json_events);
    }

    #[test]
    fn flags_override_file() {
        let file: FileSettings = serde_json::from_str(
            r#"{"bufferSize": 500, "name": "file-%s.aiff", "trigger": "signal", "lineDurationSecs": 5}"#,
        )
        .unwrap();
        let args = Args {
            buffer_size: Some(700),
            ..Args::default()
        };
        let run = resolve(&args, file).unwrap();
        assert_eq!(run.recorder.capacity_frames, 700);
        assert_eq!(run.recorder.name_template.to_string(), "file-%s.aiff");
        assert_eq!(run.trigger, TriggerMode::Signal);
        assert_eq!(run.line_duration, Duration::from_secs(5));
    }

    #[test]
    fn rejects_unknown_keys() {
        let parsed = serde_json::from_str::<FileSettings>(r#"{"bufferSzie": 5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_bad_template_and_capacity() {
        let args = Args {
            name: Some("no-placeholder.aiff".into()),
            ..Args::default()
        };
        assert!(resolve(&args, FileSettings::default()).is_err());

        let args = Args {
            buffer_size: Some(0),
            ..Args::default()
        };
        assert!(resolve(&args, FileSettings::default()).is_err());
    }

    #[test]
    fn rejects_negative_line_duration() {
        let args = Args {
            line_duration: Some(-1.0),
            ..Args::default()
        };
        assert!(resolve(&args, FileSettings::default()).is_err());
    }

    #[test]
    fn blank_device_means_default() {
        let args = Args {
            device: Some("  ".into()),
            ..Args::default()
        };
        let run = resolve(&args, FileSettings::default()).unwrap();
        assert_eq!(run.recorder.preferred_device, None);
    }
}
