//! Tracing subscriber setup.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().load()?;
//! botbot_runtime::logging::init_from_config(&config.logging)?;
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level; per-target
//! `filters` are added on top either way.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{Level, debug, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig};

const DEFAULT_LOG_FILE: &str = "botbot.log";

/// Initializes the global subscriber from `[logging]`.
///
/// Fails if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) -> Result<(), TryInitError> {
    LoggingBuilder::from_config(config).try_init()
}

/// Builder for the global tracing subscriber.
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Level,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
    file_path: Option<PathBuf>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            file_path: None,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new()
            .format(config.format)
            .output(config.output)
            .with_thread_ids(config.thread_ids)
            .with_file(config.file_location)
            .with_line_number(config.file_location);

        builder.level = Level::from_str(&config.level).unwrap_or(Level::INFO);
        builder.file_path.clone_from(&config.file_path);
        for (target, level) in &config.filters {
            builder = builder.directive(&format!("{target}={}", level.to_lowercase()));
        }
        builder
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Adds an `EnvFilter` directive such as `botbot_framework=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    pub fn with_line_number(mut self, enabled: bool) -> Self {
        self.with_line_number = enabled;
        self
    }

    pub fn file_path(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base = self.level.as_str().to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base));

        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Like [`try_init`](Self::try_init), but keeps an already installed
    /// subscriber and reports that through it.
    pub fn init(self) {
        if let Err(e) = self.try_init() {
            debug!(error = %e, "Tracing subscriber already installed, keeping it");
        }
    }

    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
            };
        }

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => tracing_subscriber::registry()
                        .with(fmt::layer().json().with_writer($writer))
                        .with(filter)
                        .try_init(),
                    LogFormat::Compact => tracing_subscriber::registry()
                        .with(configure_layer!(fmt::layer().compact().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                    LogFormat::Full => tracing_subscriber::registry()
                        .with(configure_layer!(fmt::layer().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                    LogFormat::Pretty => tracing_subscriber::registry()
                        .with(configure_layer!(fmt::layer().pretty().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                }
            };
        }

        match (self.output, &self.file_path) {
            (LogOutput::Stdout, _) => init_with_writer!(std::io::stdout),
            (LogOutput::Stderr, _) => init_with_writer!(std::io::stderr),
            (LogOutput::File, Some(path)) => {
                let appender = tracing_appender::rolling::never(
                    path.parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .unwrap_or_else(|| Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE)),
                );
                init_with_writer!(appender)
            }
            (LogOutput::File, None) => {
                let result = init_with_writer!(std::io::stderr);
                warn!("File output requested without logging.file_path, logging to stderr");
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_from_config() {
        let config = LoggingConfig {
            level: "DEBUG".into(),
            file_location: true,
            filters: BTreeMap::from([("botbot_framework".to_string(), "Trace".to_string())]),
            ..Default::default()
        };
        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.output, LogOutput::Stderr);
        assert!(builder.with_file && builder.with_line_number);
        assert_eq!(builder.directives, ["botbot_framework=trace"]);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let config = LoggingConfig {
            level: "chatty".into(),
            ..Default::default()
        };
        assert_eq!(LoggingBuilder::from_config(&config).level, Level::INFO);
    }

    #[test]
    fn test_second_init_is_reported() {
        let _ = LoggingBuilder::new().try_init();
        assert!(LoggingBuilder::new().try_init().is_err());
        assert!(init_from_config(&LoggingConfig::default()).is_err());
    }
}
