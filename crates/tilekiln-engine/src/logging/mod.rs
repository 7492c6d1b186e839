//! Logging utilities.
//!
//! Logger initialization for binaries and tests, plus the `Diagnostics`
//! capability the context reports compile/link and capability problems through.

mod diagnostics;
mod init;

pub use diagnostics::{CaptureDiagnostics, Diagnostics, LogDiagnostics, Severity};
pub use init::{LoggingConfig, init_logging};
