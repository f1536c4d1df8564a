//! Unified error type for the sdrtune-lib crate.
//!
//! [`SdrError`] carries one variant per failure kind a caller has to handle
//! differently (bad value, wrong lifecycle state, conflicting settings,
//! unsupported hardware, backend fault) plus the ambient `Io` and `Config`
//! kinds. `From` impls allow `?` to propagate across module boundaries.
//!
//! String payloads follow the convention **"context: details"** where
//! *context* names the operation (e.g. `"set_gain"`, `"read_sync"`) and
//! *details* carries the offending value and the device index.

use std::fmt;

/// Unified error type for sdrtune-lib operations.
#[derive(Debug)]
pub enum SdrError {
    /// Value rejected by local or hardware-reported constraints.
    /// Safe to retry with a corrected value.
    Validation(String),
    /// Operation invoked in the wrong lifecycle state (closed device,
    /// stream bound to the other read mode, ...).
    State(String),
    /// Value rejected because of another active setting.
    Conflict(String),
    /// Feature not available on this hardware variant.
    Unsupported(String),
    /// Backend or hardware failure during open, transfer or release.
    Resource(String),
    /// Standard I/O error (config persistence, capture output).
    Io(std::io::Error),
    /// Configuration file error.
    Config(String),
}

/// Discriminant of [`SdrError`], for callers that only need to branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    Conflict,
    Unsupported,
    Resource,
    Io,
    Config,
}

impl SdrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdrError::Validation(_) => ErrorKind::Validation,
            SdrError::State(_) => ErrorKind::State,
            SdrError::Conflict(_) => ErrorKind::Conflict,
            SdrError::Unsupported(_) => ErrorKind::Unsupported,
            SdrError::Resource(_) => ErrorKind::Resource,
            SdrError::Io(_) => ErrorKind::Io,
            SdrError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether retrying on the same device can succeed once the caller fixes
    /// the input or the conflicting setting.
    ///
    /// `Resource` errors are not retried by the library; callers may still
    /// retry at a higher level (see [`crate::reconnect`]).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdrError::Validation(_) | SdrError::Conflict(_))
    }
}

impl fmt::Display for SdrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdrError::Validation(e) => write!(f, "Invalid value: {e}"),
            SdrError::State(e) => write!(f, "Invalid state: {e}"),
            SdrError::Conflict(e) => write!(f, "Conflicting settings: {e}"),
            SdrError::Unsupported(e) => write!(f, "Unsupported: {e}"),
            SdrError::Resource(e) => write!(f, "Device failure: {e}"),
            SdrError::Io(e) => write!(f, "I/O error: {e}"),
            SdrError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for SdrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SdrError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SdrError {
    fn from(e: std::io::Error) -> Self {
        SdrError::Io(e)
    }
}

/// Crate-level Result alias using [`SdrError`].
pub type Result<T> = std::result::Result<T, SdrError>;
