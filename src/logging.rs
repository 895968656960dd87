//! Logging setup for hosts embedding the bridge.
//!
//! The bridge emits `tracing` events at every boundary crossing: `trace` for
//! resolved calls, `debug` for resolutions, connections and lifetime changes,
//! `warn`/`error` for outbound calls that were dropped. Hosts that already
//! install a subscriber need nothing from this module; others can call
//! [`init`] once at startup.

use std::sync::OnceLock;

pub use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable.
    Pretty,
    /// Single line per event.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level for the bridge's own targets.
    pub level: Level,
    pub format: LogFormat,
    /// Emit span open/close events.
    pub span_events: bool,
    /// Custom filter directives (e.g. `"nativebind=trace,my_game=info"`),
    /// replacing `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO },
            format: LogFormat::Compact,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Read `NATIVEBIND_LOG` (filter directives), `NATIVEBIND_LOG_LEVEL`,
    /// `NATIVEBIND_LOG_FORMAT` and `NATIVEBIND_LOG_SPANS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(filter) = lookup("NATIVEBIND_LOG") {
            config.filter = Some(filter);
        }
        if let Some(level) = lookup("NATIVEBIND_LOG_LEVEL")
            && let Ok(level) = level.trim().parse::<Level>()
        {
            config.level = level;
        }
        if let Some(format) = lookup("NATIVEBIND_LOG_FORMAT") {
            config.format = match format.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                _ => LogFormat::Compact,
            };
        }
        if let Some(spans) = lookup("NATIVEBIND_LOG_SPANS") {
            config.span_events = matches!(spans.trim(), "1" | "true" | "on");
        }
        config
    }

    fn build_filter(&self) -> EnvFilter {
        let default_directives = || {
            let level = self.level.as_str().to_ascii_lowercase();
            EnvFilter::new(format!("nativebind={level},nativebind_registry={level}"))
        };
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| default_directives()),
            None => default_directives(),
        }
    }
}

static INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Install a subscriber configured from the environment.
///
/// Returns `true` if the bridge's subscriber is the active global subscriber.
pub fn init() -> bool {
    init_with_config(LogConfig::from_env())
}

/// Install a subscriber with an explicit configuration.
///
/// Only the first call has an effect. If another subscriber was already set
/// globally this returns `false` and the existing one is left in place.
pub fn init_with_config(config: LogConfig) -> bool {
    *INITIALIZED.get_or_init(|| install(&config))
}

/// Whether a previous call installed the bridge's subscriber.
pub fn is_initialized() -> bool {
    INITIALIZED.get().copied().unwrap_or(false)
}

fn install(config: &LogConfig) -> bool {
    let filter = config.build_filter();
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer().pretty().with_span_events(spans).with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init().is_ok()
        }
        LogFormat::Compact => {
            let layer = fmt::layer().compact().with_span_events(spans).with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init().is_ok()
        }
    }
}
