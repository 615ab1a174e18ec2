//! Subscriber setup for the crate's `tracing` events
//!
//! Every event the container emits uses the `ioc_graph` target:
//! registrations, scope lifecycle and plan cache publishes at `DEBUG`,
//! cache hits and per-dependency planning at `TRACE`.
//!
//! Installing a subscriber needs `logging-json` or `logging-pretty`;
//! without either, the `init*` functions do nothing.
//!
//! ```rust,ignore
//! use ioc_graph::logging;
//!
//! logging::init_pretty();
//!
//! logging::builder()
//!     .trace()
//!     .resolver_only()
//!     .compact()
//!     .init();
//! ```

use tracing::Level;

/// Target used by every event of this crate.
pub const TARGET: &str = "ioc_graph";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, human oriented
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            from_env: false,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
            with_thread_names: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Only events whose target starts with `target`.
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only this crate's events.
    pub fn resolver_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Prefer `RUST_LOG` when it is set and parses.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directive equivalent to this builder's level and target.
    pub fn directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the global subscriber.
    ///
    /// Returns `false` when a global subscriber is already installed.
    /// `Json` falls back to `Compact` without `logging-json`.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) -> bool {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let directive = self.directive();
        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive))
        } else {
            EnvFilter::new(&directive)
        };

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_thread_names(self.with_thread_names)
            .with_target(true);
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            _ => registry.with(layer.compact()).try_init(),
        };
        installed.is_ok()
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) -> bool {
        false
    }
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON under `logging-json`, pretty otherwise.
pub fn init() -> bool {
    if cfg!(feature = "logging-json") { init_json() } else { init_pretty() }
}

pub fn init_json() -> bool {
    builder().json().debug().init()
}

pub fn init_pretty() -> bool {
    builder().pretty().debug().init()
}

/// Events of this crate only, at `TRACE`.
pub fn init_resolver_only() -> bool {
    builder().resolver_only().trace().init()
}
