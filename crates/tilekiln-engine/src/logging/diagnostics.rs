use std::sync::Mutex;

/// Severity of a diagnostic message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Warn,
    Error,
}

/// Sink for messages the engine reports instead of failing.
///
/// Shader compile/link failures, unresolved variable locations, missing
/// capabilities and bad handles all end up here. The context owns one sink;
/// swap it to capture output deterministically.
pub trait Diagnostics: Send + Sync {
    fn report(&self, severity: Severity, message: &str);

    fn debug(&self, message: &str) {
        self.report(Severity::Debug, message);
    }

    fn warn(&self, message: &str) {
        self.report(Severity::Warn, message);
    }

    fn error(&self, message: &str) {
        self.report(Severity::Error, message);
    }
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => log::debug!(target: "tilekiln", "{message}"),
            Severity::Warn => log::warn!(target: "tilekiln", "{message}"),
            Severity::Error => log::error!(target: "tilekiln", "{message}"),
        }
    }
}

/// Records every message; also forwards to `log` so test output stays readable.
#[derive(Debug, Default)]
pub struct CaptureDiagnostics {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl CaptureDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn messages(&self) -> Vec<(Severity, String)> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages at `Error` severity.
    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(s, _)| *s == Severity::Error)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|(_, m)| m.contains(needle))
    }

    pub fn clear(&self) {
        match self.messages.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Diagnostics for CaptureDiagnostics {
    fn report(&self, severity: Severity, message: &str) {
        LogDiagnostics.report(severity, message);
        match self.messages.lock() {
            Ok(mut guard) => guard.push((severity, message.to_owned())),
            Err(poisoned) => poisoned.into_inner().push((severity, message.to_owned())),
        }
    }
}
