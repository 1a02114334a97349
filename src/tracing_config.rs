//! Tracing subscriber setup for the server binary
//!
//! The library only emits events; the binary installs a subscriber here.
//! `RUST_LOG` takes precedence over the `-v` count.

use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored human-readable output (default)
    Console,
    /// Plain output without colors, for CI and containers
    Compact,
    /// JSON lines with span context
    #[cfg(feature = "tracing-json")]
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "pretty" => Ok(Self::Console),
            "compact" | "plain" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format '{other}'")),
        }
    }
}

/// Keeps buffered file writers alive; flushes on drop
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `-v` count: 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit filter directive, used when `RUST_LOG` is unset
    pub env_filter: Option<String>,
    /// Also append log lines to this file
    #[cfg(feature = "tracing-files")]
    pub log_file: Option<std::path::PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            #[cfg(feature = "tracing-files")]
            log_file: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

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
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[cfg(feature = "tracing-files")]
    #[must_use]
    pub fn with_log_file<P: Into<std::path::PathBuf>>(mut self, path: P) -> Self {
        self.log_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directive = self
            .env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_to_filter());
        Ok(EnvFilter::try_new(directive)?)
    }

    fn console_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        use tracing_subscriber::fmt;

        match self.format {
            TracingFormat::Console => fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .compact()
                .boxed(),
            TracingFormat::Compact => fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .compact()
                .boxed(),
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let filter = self.build_filter()?;
        #[allow(unused_mut)]
        let mut layers = vec![self.console_layer()];
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        #[cfg(feature = "tracing-files")]
        {
            if let Some(path) = &self.log_file {
                use tracing_appender::{non_blocking, rolling};

                let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("bgremove-api.log"));
                let (writer, file_guard) = non_blocking(rolling::never(directory, file_name));

                layers.push(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .boxed(),
                );
                guard._file = Some(file_guard);
            }
        }

        Registry::default().with(layers).with(filter).try_init()?;
        Ok(guard)
    }
}
