// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry initialization and configuration.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Name of the log file written under the configured log directory.
pub const LOG_FILE_NAME: &str = "a2a.log";

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Whether to include span events (enter/exit).
    pub include_span_events: bool,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to include target module path.
    pub include_target: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Whether to use compact log format.
    pub compact: bool,

    /// Custom filter directive (overrides default_level).
    pub filter_directive: Option<String>,

    /// Directory that receives a plain-text copy of the log.
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            include_span_events: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            compact: true,
            filter_directive: None,
            log_dir: None,
        }
    }
}

impl TelemetryConfig {
    /// Verbose output for `--debug`.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_span_events: true,
            include_file_line: true,
            include_target: true,
            ansi_colors: true,
            compact: false,
            filter_directive: None,
            log_dir: None,
        }
    }

    /// Minimal output for long-running watch loops.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            include_span_events: false,
            include_file_line: false,
            include_target: false,
            ansi_colors: false,
            compact: true,
            filter_directive: None,
            log_dir: None,
        }
    }

    /// Trace-level output for tests.
    pub fn testing() -> Self {
        Self {
            default_level: Level::TRACE,
            include_span_events: true,
            include_file_line: true,
            include_target: true,
            ansi_colors: false,
            compact: false,
            filter_directive: Some("a2a=trace".to_string()),
            log_dir: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    /// Also append log lines to `<dir>/a2a.log`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

/// Handle returned by [`init_telemetry`].
///
/// Keep this guard alive for the duration of the program.
#[derive(Debug)]
pub struct TelemetryGuard {
    log_file: Option<PathBuf>,
}

impl TelemetryGuard {
    /// Path of the log file, when one is being written.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

fn open_log_file(dir: &Path) -> io::Result<(PathBuf, fs::File)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Initialize telemetry with the given configuration.
///
/// Human-readable output goes to stderr so command output on stdout stays clean.
/// Call once at startup.
///
/// ```rust,ignore
/// use a2a::telemetry::{init_telemetry, TelemetryConfig};
///
/// let _guard = init_telemetry(&TelemetryConfig::default().with_log_dir(".a2a/logs"))?;
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    // RUST_LOG wins unless an explicit directive was given
    let filter = match &config.filter_directive {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(format!("{}", config.default_level))),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}", config.default_level))),
    };

    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    let (log_file, file_layer) = match &config.log_dir {
        Some(dir) => {
            let (path, file) = open_log_file(dir)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);
            (Some(path), Some(layer))
        }
        None => (None, None),
    };

    // The file layer sits directly on the filtered registry so both branches share its type.
    let base = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.compact {
        base.with(fmt_layer.compact())
            .try_init()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    } else {
        base.with(fmt_layer)
            .try_init()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    }

    Ok(TelemetryGuard { log_file })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.default_level, Level::WARN);
        assert!(config.compact);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_telemetry_config_presets() {
        assert_eq!(TelemetryConfig::development().default_level, Level::DEBUG);
        assert!(!TelemetryConfig::production().include_span_events);
        assert_eq!(
            TelemetryConfig::testing().filter_directive.as_deref(),
            Some("a2a=trace")
        );
    }

    #[test]
    fn test_telemetry_config_builder() {
        let config = TelemetryConfig::default()
            .with_level(Level::DEBUG)
            .with_filter("a2a::routing=trace")
            .with_ansi(false)
            .with_log_dir("logs");

        assert_eq!(config.default_level, Level::DEBUG);
        assert_eq!(config.filter_directive, Some("a2a::routing=trace".to_string()));
        assert!(!config.ansi_colors);
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("logs");
        let (path, _file) = open_log_file(&dir).unwrap();
        assert_eq!(path, dir.join(LOG_FILE_NAME));
        assert!(path.exists());
    }

    #[test]
    fn test_init_telemetry_writes_log_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("logs");
        let config = TelemetryConfig::testing()
            .with_ansi(false)
            .with_log_dir(dir.clone());

        // Only the first subscriber in a process installs; the file is opened either way.
        match init_telemetry(&config) {
            Ok(guard) => {
                assert_eq!(guard.log_file(), Some(dir.join(LOG_FILE_NAME).as_path()));
                tracing::warn!(target: "a2a", "telemetry file check");
                let content = fs::read_to_string(dir.join(LOG_FILE_NAME)).unwrap();
                assert!(content.contains("telemetry file check"));
            }
            Err(_) => {}
        }
        assert!(dir.join(LOG_FILE_NAME).exists());
    }
}
