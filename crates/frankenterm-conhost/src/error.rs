#![forbid(unsafe_code)]

//! Error taxonomy for the translation layer.
//!
//! | Failure | Variant | Caller sees |
//! |---------|---------|-------------|
//! | Native call reported failure | [`ConsoleError::Io`] | OS error code, or `InvalidInput` when none |
//! | Numeric parameter unparsable (cursor moves, SGR) | [`ConsoleError::InvalidParameter`] | command aborted |
//! | SGR value outside the supported table | [`ConsoleError::UnsupportedSgr`] | fold short-circuits, nothing applied |
//! | Unknown command letter | none | silently ignored |

use std::fmt;
use std::io;

/// Errors produced while translating commands or key events.
#[derive(Debug)]
pub enum ConsoleError {
    /// A console surface call failed.
    Io(io::Error),
    /// A numeric parameter could not be parsed.
    InvalidParameter {
        /// Final byte of the command that carried the parameter.
        command: char,
        /// Zero-based parameter position.
        index: usize,
        /// The raw parameter text.
        value: String,
    },
    /// An SGR value the attribute translator does not know.
    UnsupportedSgr(i64),
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "console call failed: {err}"),
            Self::InvalidParameter {
                command,
                index,
                value,
            } => write!(
                f,
                "invalid parameter {index} for CSI '{command}': {value:?}"
            ),
            Self::UnsupportedSgr(value) => write!(f, "unsupported SGR value {value}"),
        }
    }
}

impl std::error::Error for ConsoleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConsoleError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ConsoleError> for io::Error {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

/// A failed dispatch.
///
/// The whole command is still considered consumed so that the caller's
/// stream position stays aligned; [`DispatchError::consumed`] reports it.
#[derive(Debug)]
pub struct DispatchError {
    consumed: usize,
    source: ConsoleError,
}

impl DispatchError {
    pub(crate) fn new(consumed: usize, source: ConsoleError) -> Self {
        Self { consumed, source }
    }

    /// Number of command bytes consumed (always the full command length).
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &ConsoleError {
        &self.source
    }

    /// Discard the byte count and keep the underlying error.
    #[must_use]
    pub fn into_error(self) -> ConsoleError {
        self.source
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes consumed)", self.source, self.consumed)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
