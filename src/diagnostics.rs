//! Side channel for failures on outbound calls.
//!
//! When the engine calls into managed code (a virtual override, a signal
//! handler) there is no caller that could receive a `Result`. Failures on
//! those paths are recorded here, logged through `tracing`, and the engine
//! receives a neutral value.

use std::collections::VecDeque;
use std::fmt;

use nativebind_core::{BridgeError, ObjectId};

use crate::signals::ConnectionId;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// An outbound call was dropped.
    Error,
    /// Something the host should look at, e.g. a leak at shutdown.
    Warning,
    Info,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
        })
    }
}

/// Where a diagnostic originated.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticSource {
    /// A virtual method invocation from the engine.
    Virtual { object: ObjectId, method: String },
    /// A signal delivery to a managed handler.
    Signal { connection: ConnectionId, signal: String },
    /// A handle release or liveness check.
    Lifetime { object: ObjectId },
    /// A script attach request from the engine.
    Script { object: ObjectId, script: String },
    Shutdown,
}

impl fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSource::Virtual { object, method } => write!(f, "virtual {method} on {object}"),
            DiagnosticSource::Signal { connection, signal } => write!(f, "signal {signal} ({connection})"),
            DiagnosticSource::Lifetime { object } => write!(f, "lifetime of {object}"),
            DiagnosticSource::Script { object, script } => write!(f, "script {script} on {object}"),
            DiagnosticSource::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// One recorded failure or notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source: DiagnosticSource,
    pub message: String,
    /// The error that caused this diagnostic, if any.
    pub error: Option<BridgeError>,
}

impl Diagnostic {
    pub fn error(source: DiagnosticSource, error: BridgeError) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            message: error.to_string(),
            source,
            error: Some(error),
        }
    }

    pub fn warning(source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            source,
            message: message.into(),
            error: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.kind, self.source, self.message)
    }
}

/// Bounded collection of diagnostics; the oldest entry is evicted when full.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diagnostics: VecDeque<Diagnostic>,
    capacity: usize,
    evicted: usize,
    has_errors: bool,
}

impl Diagnostics {
    /// Create an empty collection holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            diagnostics: VecDeque::new(),
            capacity,
            evicted: 0,
            has_errors: false,
        }
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind == DiagnosticKind::Error {
            self.has_errors = true;
        }
        if self.capacity == 0 {
            self.evicted += 1;
            return;
        }
        if self.diagnostics.len() == self.capacity {
            self.diagnostics.pop_front();
            self.evicted += 1;
        }
        self.diagnostics.push_back(diagnostic);
    }

    /// Whether an error was recorded since the last clear, evicted ones included.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.kind == DiagnosticKind::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.kind == DiagnosticKind::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of entries dropped because the collection was full.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Remove and return every entry, resetting the error flag.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.has_errors = false;
        self.evicted = 0;
        self.diagnostics.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.take();
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn object() -> ObjectId {
        ObjectId::new(1, NonZeroU32::MIN)
    }

    fn virtual_error(method: &str) -> Diagnostic {
        Diagnostic::error(
            DiagnosticSource::Virtual {
                object: object(),
                method: method.into(),
            },
            BridgeError::UnknownVirtual {
                class: "Node".into(),
                method: method.into(),
            },
        )
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut diagnostics = Diagnostics::with_capacity(2);
        diagnostics.add_diagnostic(virtual_error("_a"));
        diagnostics.add_diagnostic(virtual_error("_b"));
        diagnostics.add_diagnostic(virtual_error("_c"));

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.evicted(), 1);
        let methods: Vec<_> = diagnostics
            .iter()
            .map(|d| match &d.source {
                DiagnosticSource::Virtual { method, .. } => method.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(methods, vec!["_b", "_c"]);
    }

    #[test]
    fn counts_by_kind() {
        let mut diagnostics = Diagnostics::with_capacity(8);
        diagnostics.add_diagnostic(virtual_error("_a"));
        diagnostics.add_diagnostic(Diagnostic::warning(DiagnosticSource::Shutdown, "leak"));
        assert!(diagnostics.has_errors());
        assert!(diagnostics.has_warnings());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 1);

        let taken = diagnostics.take();
        assert_eq!(taken.len(), 2);
        assert!(!diagnostics.has_errors());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn display_includes_source() {
        let d = virtual_error("_proces");
        assert_eq!(
            d.to_string(),
            "error: virtual _proces on 1v1: '_proces' is not a virtual method of Node"
        );
    }
}
