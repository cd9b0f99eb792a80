// ABOUTME: tracing subscriber setup that tees every record to the console and the log file
// ABOUTME: Timestamps are rendered in the configured UTC offset

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

#[derive(Debug, Clone, Copy)]
pub struct ZonedTimer {
    offset: FixedOffset,
}

impl ZonedTimer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_timestamp(&Utc::now().with_timezone(&self.offset)))
    }
}

pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global subscriber. With `log_file` set, records are appended there too.
pub fn init(log_file: Option<&Path>, offset: FixedOffset, verbose: bool) -> Result<()> {
    let timer = ZonedTimer::new(offset);
    let console = fmt::layer().with_target(false).with_timer(timer);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_timer(timer)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timer_writes_configured_offset() {
        let timer = ZonedTimer::new(FixedOffset::east_opt(2 * 3600).unwrap());
        let mut rendered = String::new();
        timer.format_time(&mut Writer::new(&mut rendered)).unwrap();
        assert!(rendered.ends_with("+02:00"), "{}", rendered);
    }

    #[test]
    fn test_format_timestamp() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let at = tz.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(&at), "2026-01-02 03:04:05-05:00");
    }
}
