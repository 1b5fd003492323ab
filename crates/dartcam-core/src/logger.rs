//! Minimal stderr logger with a frame tag.
//!
//! Lines look like `[  12.345s #0042 DEBUG pipeline] message`. The frame
//! loop calls [`set_log_frame`] before each frame so that every line logged
//! while that frame is processed carries its index; threads that never set
//! a frame (status observers, for one) print `#----`.

use std::cell::Cell;
use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

thread_local! {
    static FRAME: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Tag subsequent log lines on this thread with `frame`.
pub fn set_log_frame(frame: Option<u64>) {
    FRAME.with(|f| f.set(frame));
}

pub fn log_frame() -> Option<u64> {
    FRAME.with(Cell::get)
}

fn format_line(
    elapsed_secs: f64,
    frame: Option<u64>,
    level: Level,
    target: &str,
    args: &fmt::Arguments<'_>,
) -> String {
    // module path tail only: `dartcam_scoring::visit` -> `visit`
    let target = target.rsplit("::").next().unwrap_or_default();
    match frame {
        Some(n) => format!("[{elapsed_secs:8.3}s #{n:04} {level:>5} {target}] {args}"),
        None => format!("[{elapsed_secs:8.3}s #---- {level:>5} {target}] {args}"),
    }
}

struct FrameLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for FrameLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            log_frame(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<FrameLogger> = OnceLock::new();

/// Install the logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| FrameLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// `RUST_LOG` when set, otherwise `level` for every target.
#[cfg(feature = "tracing")]
fn tracing_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()))
}

/// Install a `tracing-subscriber` instead of the frame logger. Span close
/// events carry the frame index recorded by the instrumented hot paths.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = tracing_filter(level);
    if json {
        let _ = tracing_fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = tracing_fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(tracing_fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
