//! Structured logging facility.
//!
//! Two cooperating pieces, both hand-rolled rather than pulled from `log`/`tracing`:
//! `DecoderLogger` is an in-process ring of recent diagnostic entries with
//! per-subsystem level filtering, used by the DSP/frame pipeline for cheap
//! "is this worth computing a message for" checks; `StructuredEventLogger`
//! serializes typed `LogEvent`s to a file/stdout/stderr sink for operators and
//! downstream tooling. Terminal suppression while a UI owns the terminal
//! is a property of which sink `StructuredEventLogger` was built
//! with, not a separate code path.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Per-subsystem filtering knobs, mirroring the diagnostic categories a decoder
/// operator actually wants to toggle independently (timing vs FEC vs trunking).
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub enable_timing: bool,
    pub enable_carrier: bool,
    pub enable_framing: bool,
    pub enable_fec: bool,
    pub enable_trunking: bool,
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_timing: false,
            enable_carrier: false,
            enable_framing: true,
            enable_fec: true,
            enable_trunking: true,
            max_entries: 1000,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            enable_timing: true,
            enable_carrier: true,
            enable_framing: true,
            enable_fec: true,
            enable_trunking: true,
            max_entries: 4000,
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            enable_timing: false,
            enable_carrier: false,
            enable_framing: false,
            enable_fec: false,
            enable_trunking: true,
            max_entries: 200,
        }
    }

    pub fn disabled() -> Self {
        Self {
            level: LogLevel::Error,
            enable_timing: false,
            enable_carrier: false,
            enable_framing: false,
            enable_fec: false,
            enable_trunking: false,
            max_entries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Timing,
    Carrier,
    Framing,
    Fec,
    Trunking,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub subsystem: Subsystem,
    pub message: String,
    pub at: Instant,
}

/// Bounded ring of recent diagnostic entries, consulted by a UI/telemetry panel.
#[derive(Debug)]
pub struct DecoderLogger {
    config: LogConfig,
    entries: Vec<LogEntry>,
}

impl DecoderLogger {
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    fn subsystem_enabled(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Timing => self.config.enable_timing,
            Subsystem::Carrier => self.config.enable_carrier,
            Subsystem::Framing => self.config.enable_framing,
            Subsystem::Fec => self.config.enable_fec,
            Subsystem::Trunking => self.config.enable_trunking,
        }
    }

    pub fn log(&mut self, level: LogLevel, subsystem: Subsystem, message: impl Into<String>) {
        if self.config.max_entries == 0 || level < self.config.level {
            return;
        }
        if !self.subsystem_enabled(subsystem) {
            return;
        }
        self.entries.push(LogEntry {
            level,
            subsystem,
            message: message.into(),
            at: Instant::now(),
        });
        if self.entries.len() > self.config.max_entries {
            let excess = self.entries.len() - self.config.max_entries;
            self.entries.drain(0..excess);
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

// --- Structured event logging (file/stdout/stderr sink) -------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Logfmt,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct EventLoggerConfig {
    pub target: LogTarget,
    pub file_path: Option<PathBuf>,
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for EventLoggerConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::Stdout,
            file_path: None,
            format: LogFormat::Json,
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Info { message: String },
    Warn { message: String },
    Error { message: String },
    FrameDecode(FrameDecodeEvent),
    Telemetry(TelemetryEvent),
    Statistics(StatisticsEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDecodeEvent {
    pub frame_index: usize,
    pub duid: String,
    pub fec_ok: bool,
    pub corrected_symbols: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub snr_db: f64,
    pub fll_offset_hz: f64,
    pub producer_drops: u64,
    pub read_timeouts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsEvent {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub tune_count: u64,
    pub release_count: u64,
    pub cc_return_count: u64,
}

/// Serializes `LogEvent`s to a `Box<dyn Write + Send>` sink in one of three formats.
pub struct StructuredEventLogger {
    writer: Box<dyn Write + Send>,
    format: LogFormat,
    level: LogLevel,
    started: Instant,
}

impl StructuredEventLogger {
    pub fn new(config: EventLoggerConfig) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match config.target {
            LogTarget::Stdout => Box::new(std::io::stdout()),
            LogTarget::Stderr => Box::new(std::io::stderr()),
            LogTarget::File => {
                let path = config
                    .file_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("dsd-neo.log"));
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                Box::new(file)
            }
        };
        Ok(Self {
            writer,
            format: config.format,
            level: config.level,
            started: Instant::now(),
        })
    }

    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn level_of(event: &LogEvent) -> LogLevel {
        match event {
            LogEvent::Info { .. } | LogEvent::FrameDecode(_) | LogEvent::Telemetry(_) => {
                LogLevel::Info
            }
            LogEvent::Statistics(_) => LogLevel::Info,
            LogEvent::Warn { .. } => LogLevel::Warn,
            LogEvent::Error { .. } => LogLevel::Error,
        }
    }

    pub fn log(&mut self, event: LogEvent) -> Result<()> {
        if Self::level_of(&event) < self.level {
            return Ok(());
        }
        let line = match self.format {
            LogFormat::Json => serde_json::to_string(&event).unwrap_or_default(),
            LogFormat::Logfmt => format_logfmt(&event),
            LogFormat::Pretty => format_pretty(&event),
        };
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn format_logfmt(event: &LogEvent) -> String {
    match event {
        LogEvent::Info { message } => format!("level=info msg={message:?}"),
        LogEvent::Warn { message } => format!("level=warn msg={message:?}"),
        LogEvent::Error { message } => format!("level=error msg={message:?}"),
        LogEvent::FrameDecode(f) => format!(
            "level=info event=frame_decode frame={} duid={} fec_ok={} corrected={}",
            f.frame_index, f.duid, f.fec_ok, f.corrected_symbols
        ),
        LogEvent::Telemetry(t) => format!(
            "level=info event=telemetry snr_db={:.2} fll_offset_hz={:.2} drops={} timeouts={}",
            t.snr_db, t.fll_offset_hz, t.producer_drops, t.read_timeouts
        ),
        LogEvent::Statistics(s) => format!(
            "level=info event=statistics duration_secs={:.2} tunes={} releases={} cc_returns={}",
            s.duration_secs, s.tune_count, s.release_count, s.cc_return_count
        ),
    }
}

fn format_pretty(event: &LogEvent) -> String {
    match event {
        LogEvent::Info { message } => format!("[INFO] {message}"),
        LogEvent::Warn { message } => format!("[WARN] {message}"),
        LogEvent::Error { message } => format!("[ERROR] {message}"),
        LogEvent::FrameDecode(f) => format!(
            "[FRAME] #{} duid={} fec_ok={} corrected={}",
            f.frame_index, f.duid, f.fec_ok, f.corrected_symbols
        ),
        LogEvent::Telemetry(t) => format!(
            "[TELEMETRY] snr={:.1}dB fll={:.1}Hz drops={} timeouts={}",
            t.snr_db, t.fll_offset_hz, t.producer_drops, t.read_timeouts
        ),
        LogEvent::Statistics(s) => format!(
            "[STATS] {:.1}s tunes={} releases={} cc_returns={}",
            s.duration_secs, s.tune_count, s.release_count, s.cc_return_count
        ),
    }
}

/// Resolves the platform cache root used for persisted CC-candidate files,
/// honoring `$DSD_NEO_CACHE_DIR` as an override before falling back to the OS cache dir.
pub fn cache_root() -> PathBuf {
    if let Ok(dir) = std::env::var("DSD_NEO_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("dsd-neo")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_logger_filters_by_level() {
        let mut logger = DecoderLogger::new(LogConfig {
            level: LogLevel::Warn,
            ..LogConfig::verbose()
        });
        logger.log(LogLevel::Debug, Subsystem::Fec, "ignored");
        logger.log(LogLevel::Error, Subsystem::Fec, "kept");
        assert_eq!(logger.entries().len(), 1);
        assert_eq!(logger.entries()[0].message, "kept");
    }

    #[test]
    fn decoder_logger_filters_by_subsystem() {
        let mut logger = DecoderLogger::new(LogConfig {
            enable_timing: false,
            ..LogConfig::verbose()
        });
        logger.log(LogLevel::Info, Subsystem::Timing, "dropped");
        logger.log(LogLevel::Info, Subsystem::Fec, "kept");
        assert_eq!(logger.entries().len(), 1);
    }

    #[test]
    fn decoder_logger_respects_max_entries() {
        let mut logger = DecoderLogger::new(LogConfig {
            max_entries: 2,
            ..LogConfig::verbose()
        });
        for i in 0..5 {
            logger.log(LogLevel::Info, Subsystem::Fec, format!("entry {i}"));
        }
        assert_eq!(logger.entries().len(), 2);
        assert_eq!(logger.entries()[0].message, "entry 3");
    }

    #[test]
    fn structured_logger_logfmt_roundtrips_fields() {
        let mut logger = StructuredEventLogger::new(EventLoggerConfig {
            target: LogTarget::Stdout,
            format: LogFormat::Logfmt,
            ..EventLoggerConfig::default()
        })
        .unwrap();
        logger
            .log(LogEvent::FrameDecode(FrameDecodeEvent {
                frame_index: 7,
                duid: "TSBK".into(),
                fec_ok: true,
                corrected_symbols: 2,
            }))
            .unwrap();
    }
}
