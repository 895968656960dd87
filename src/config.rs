//! Bridge configuration.

use std::fmt;

/// Tunable bridge properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeProperty {
    /// Fail fast with `WrongThread` when a main-thread-only entry point is
    /// called from another thread.
    EnforceMainThread,
    /// Check Manual handles against the engine's liveness table before use.
    ValidateManualHandles,
    /// Capacity of the diagnostics channel; the oldest entries are evicted.
    MaxDiagnostics,
    /// Report managed-constructed Manual objects still alive at shutdown.
    ReportLeaksOnShutdown,
    /// Capacity of the DEFERRED signal queue; emissions past it are dropped
    /// and reported.
    MaxDeferredSignals,
}

impl BridgeProperty {
    pub const ALL: [BridgeProperty; 5] = [
        BridgeProperty::EnforceMainThread,
        BridgeProperty::ValidateManualHandles,
        BridgeProperty::MaxDiagnostics,
        BridgeProperty::ReportLeaksOnShutdown,
        BridgeProperty::MaxDeferredSignals,
    ];

    pub fn default_value(&self) -> usize {
        match self {
            BridgeProperty::EnforceMainThread => 1,
            BridgeProperty::ValidateManualHandles => cfg!(debug_assertions) as usize,
            BridgeProperty::MaxDiagnostics => 256,
            BridgeProperty::ReportLeaksOnShutdown => 1,
            BridgeProperty::MaxDeferredSignals => 4096,
        }
    }

    /// Environment variable read by [`BridgeConfig::from_env`].
    pub fn env_var(&self) -> &'static str {
        match self {
            BridgeProperty::EnforceMainThread => "NATIVEBIND_ENFORCE_MAIN_THREAD",
            BridgeProperty::ValidateManualHandles => "NATIVEBIND_VALIDATE_MANUAL_HANDLES",
            BridgeProperty::MaxDiagnostics => "NATIVEBIND_MAX_DIAGNOSTICS",
            BridgeProperty::ReportLeaksOnShutdown => "NATIVEBIND_REPORT_LEAKS",
            BridgeProperty::MaxDeferredSignals => "NATIVEBIND_MAX_DEFERRED_SIGNALS",
        }
    }
}

impl fmt::Display for BridgeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub enforce_main_thread: bool,
    pub validate_manual_handles: bool,
    pub max_diagnostics: usize,
    pub report_leaks_on_shutdown: bool,
    pub max_deferred_signals: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut config = Self {
            enforce_main_thread: false,
            validate_manual_handles: false,
            max_diagnostics: 0,
            report_leaks_on_shutdown: false,
            max_deferred_signals: 0,
        };
        for property in BridgeProperty::ALL {
            config.set(property, property.default_value());
        }
        config
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `NATIVEBIND_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from a variable lookup.
    ///
    /// Booleans accept `1/0/true/false/on/off/yes/no`; unparseable values are
    /// ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        for property in BridgeProperty::ALL {
            let Some(raw) = lookup(property.env_var()) else {
                continue;
            };
            match parse_value(raw.trim()) {
                Some(value) => config.set(property, value),
                None => tracing::warn!(
                    variable = property.env_var(),
                    value = %raw,
                    "ignoring unparseable bridge setting"
                ),
            }
        }
        config
    }

    pub fn get(&self, property: BridgeProperty) -> usize {
        match property {
            BridgeProperty::EnforceMainThread => self.enforce_main_thread as usize,
            BridgeProperty::ValidateManualHandles => self.validate_manual_handles as usize,
            BridgeProperty::MaxDiagnostics => self.max_diagnostics,
            BridgeProperty::ReportLeaksOnShutdown => self.report_leaks_on_shutdown as usize,
            BridgeProperty::MaxDeferredSignals => self.max_deferred_signals,
        }
    }

    pub fn set(&mut self, property: BridgeProperty, value: usize) {
        match property {
            BridgeProperty::EnforceMainThread => self.enforce_main_thread = value != 0,
            BridgeProperty::ValidateManualHandles => self.validate_manual_handles = value != 0,
            BridgeProperty::MaxDiagnostics => self.max_diagnostics = value,
            BridgeProperty::ReportLeaksOnShutdown => self.report_leaks_on_shutdown = value != 0,
            BridgeProperty::MaxDeferredSignals => self.max_deferred_signals = value,
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, property: BridgeProperty, value: usize) -> Self {
        self.set(property, value);
        self
    }
}

fn parse_value(raw: &str) -> Option<usize> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" => Some(1),
        "false" | "off" | "no" => Some(0),
        other => other.parse().ok(),
    }
}
