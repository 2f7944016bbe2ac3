//! Trigger sources: stdin lines and Unix signals.
//!
//! Both only hold a `TriggerSender`; the capture loop decides when to act.

use std::io::{self, BufRead};
use std::time::Duration;

use seekback_core::{DumpRequest, TriggerSender};
use tracing::{debug, info, warn};

/// What one stdin line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCommand {
    Dump(DumpRequest),
    Stop,
}

/// Interpret a stdin line.
///
/// - `stop` ends an open-ended dump.
/// - A number dumps with that many seconds of live audio (`0` = until `stop`).
/// - Anything else, including a blank line, dumps with `default_duration`.
pub fn parse_line(line: &str, default_duration: Duration) -> LineCommand {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("stop") {
        return LineCommand::Stop;
    }
    if let Ok(secs) = trimmed.parse::<f64>() {
        if let Ok(duration) = Duration::try_from_secs_f64(secs) {
            return LineCommand::Dump(DumpRequest::timed(duration));
        }
        warn!("ignoring invalid duration {trimmed:?}, using the default");
    } else if !trimmed.is_empty() {
        debug!(line = trimmed, "treating input line as a plain trigger");
    }
    LineCommand::Dump(DumpRequest::timed(default_duration))
}

/// Spawn a blocking thread that turns stdin lines into triggers.
///
/// The thread exits when stdin is closed or the capture loop is gone;
/// recording continues either way.
pub fn spawn_stdin_reader(triggers: TriggerSender, default_duration: Duration) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("stdin read error: {e}");
                    break;
                }
            };
            let delivered = match parse_line(&line, default_duration) {
                LineCommand::Dump(request) => {
                    info!(duration = ?request.duration, "dumping");
                    triggers.dump(request)
                }
                LineCommand::Stop => {
                    info!("stop requested");
                    triggers.stop()
                }
            };
            if !delivered {
                break;
            }
        }
        debug!("stdin reader thread exiting; stdin triggers disabled");
    });
}

/// Listen for `SIGUSR1` (open-ended dump) and `SIGUSR2` (stop).
#[cfg(unix)]
pub fn spawn_signal_listener(triggers: TriggerSender) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut dump_signal = signal(SignalKind::user_defined1())?;
    let mut stop_signal = signal(SignalKind::user_defined2())?;

    tokio::spawn(async move {
        loop {
            let delivered = tokio::select! {
                Some(()) = dump_signal.recv() => {
                    info!("SIGUSR1: dumping until SIGUSR2");
                    triggers.dump(DumpRequest::open_ended())
                }
                Some(()) = stop_signal.recv() => {
                    info!("SIGUSR2: stop requested");
                    triggers.stop()
                }
                else => break,
            };
            if !delivered {
                break;
            }
        }
        debug!("signal listener exiting");
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(_triggers: TriggerSender) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signal triggers require a unix platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seekback_core::StopCondition;

    const DEFAULT: Duration = Duration::from_secs(2);

    #[test]
    fn blank_and_text_lines_use_default_duration() {
        assert_eq!(
            parse_line("", DEFAULT),
            LineCommand::Dump(DumpRequest::timed(DEFAULT))
        );
        assert_eq!(
            parse_line("that was funny\n", DEFAULT),
            LineCommand::Dump(DumpRequest::timed(DEFAULT))
        );
    }

    #[test]
    fn numeric_lines_set_live_window() {
        assert_eq!(
            parse_line(" 7.5 ", DEFAULT),
            LineCommand::Dump(DumpRequest::timed(Duration::from_millis(7_500)))
        );
        match parse_line("0", DEFAULT) {
            LineCommand::Dump(request) => assert_eq!(request.stop_condition(), StopCondition::Signal),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn negative_numbers_fall_back_to_default() {
        assert_eq!(
            parse_line("-3", DEFAULT),
            LineCommand::Dump(DumpRequest::timed(DEFAULT))
        );
    }

    #[test]
    fn stop_is_case_insensitive() {
        assert_eq!(parse_line("STOP", DEFAULT), LineCommand::Stop);
        assert_eq!(parse_line("stop\n", DEFAULT), LineCommand::Stop);
    }
}
