use std::{ffi::NulError, fmt};

use thiserror::Error;

use crate::capture::Mode;

/// A failure summary together with the text the native engine reported for it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    summary: String,
    native: Option<String>,
}

impl Diagnostic {
    pub(crate) fn new<S: Into<String>>(summary: S, native: Option<String>) -> Self {
        Diagnostic {
            summary: summary.into(),
            native: native.filter(|text| !text.is_empty()),
        }
    }

    /// What this crate was doing when the failure occurred.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// The engine's own error text (`pcap_geterr` or an error buffer).
    pub fn native(&self) -> Option<&str> {
        self.native.as_deref()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.native {
            Some(native) => write!(f, "{}: {}", self.summary, native),
            None => f.write_str(&self.summary),
        }
    }
}

/// An error raised by a capture session or one of its collaborators.
///
/// Expected outcomes of a receive call (timeout, end of file, break) are not errors, see
/// [`ReceiveResult`](crate::ReceiveResult).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The device or file could not be opened.
    #[error("unable to open {device}: {message}")]
    DeviceOpen { device: String, message: String },

    /// The filter expression was rejected by the compiler.
    #[error("invalid filter {expression:?}: {message}")]
    FilterSyntax { expression: String, message: String },

    /// A setter or filter application was rejected by the engine.
    #[error("{0}")]
    Configuration(Diagnostic),

    /// A receive operation was called while the session is in a different mode.
    #[error("wrong mode: must be in {expected:?} mode but is in {actual:?} mode")]
    WrongMode { expected: Mode, actual: Mode },

    /// The underlying read failed.
    #[error("{0}")]
    Read(Diagnostic),

    /// A packet or a send batch could not be sent in full.
    #[error("{0}")]
    Transmit(Diagnostic),

    /// A packet does not fit in the remaining room of a send batch.
    #[error("send batch is full: {needed} bytes needed, {available} bytes available")]
    CapacityExceeded { needed: usize, available: usize },

    /// The operation is not available for this session or on this platform.
    #[error("{0} is not supported")]
    NotSupported(String),

    /// An argument was out of range or otherwise malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A dump file could not be opened or written.
    #[error("{0}")]
    DumpFile(Diagnostic),

    /// The native engine library could not be loaded.
    #[error("unable to load the pcap library: {0}")]
    LibraryLoad(String),
}

impl From<NulError> for Error {
    fn from(err: NulError) -> Error {
        Error::InvalidArgument(format!("string contains a nul byte: {}", err))
    }
}
