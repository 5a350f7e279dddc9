//! Tracing configuration for the command-line tool
//!
//! Libraries only emit events; the binary decides where they go. `log` records from the
//! progress reporters are bridged into the same subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Output to both console and a daily-rolled file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps the background file writer alive; drop it only at shutdown
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Run ID for correlating all events of one invocation
    pub run_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            run_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,subject_cutout=info",
            1 => "info,subject_cutout=debug",
            _ => "debug,subject_cutout=trace",
        }
    }

    /// Install the global subscriber
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(env_filter) => EnvFilter::try_new(env_filter)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::File(path)) => {
                let (file_writer, file_guard) = file_writer(path, false);
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .compact();
                registry.with(fmt_layer).try_init()?;
                guard._file_guard = Some(file_guard);
            },

            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::Both(path)) => {
                let (file_writer, file_guard) = file_writer(path, true);
                let console_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact();
                let file_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .compact();
                registry.with(console_layer).with(file_layer).try_init()?;
                guard._file_guard = Some(file_guard);
            },
        }

        if let Some(run_id) = &self.run_id {
            tracing::debug!(run_id = %run_id, "Tracing initialized");
        }
        Ok(guard)
    }
}

#[cfg(feature = "tracing-files")]
fn file_writer(
    path: &std::path::Path,
    daily: bool,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    use tracing_appender::{non_blocking, rolling};

    let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("subject-cutout.log"));
    let appender = if daily {
        rolling::daily(directory, file_name)
    } else {
        rolling::never(directory, file_name)
    };
    non_blocking(appender)
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one CLI invocation
    pub fn run(run_id: &str, segmenter: &str, input_count: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "run",
            run_id = %run_id,
            segmenter = %segmenter,
            input_count
        )
    }

    /// Span for one batch item, from load through export
    pub fn batch_item(index: usize, source: &str) -> Span {
        tracing::span!(Level::INFO, "batch_item", index, source = %source)
    }

    /// Span for exporting one subject
    pub fn export(subject_index: usize, rotation_degrees: u16) -> Span {
        tracing::span!(
            Level::DEBUG,
            "export",
            subject_index,
            rotation = rotation_degrees
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{debug, error, warn};

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "Operation failed");
    }

    /// Log a warning with recommendation
    pub fn warning_with_recommendation(message: &str, recommendation: &str) {
        warn!(message = %message, recommendation = %recommendation, "Warning");
    }

    /// Log a duration measurement
    pub fn performance_metric(operation: &str, duration_ms: u64) {
        debug!(operation = %operation, duration_ms, "Performance metric");
    }
}
