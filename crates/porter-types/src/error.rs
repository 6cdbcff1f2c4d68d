//! Error types and handling for Porter
//!
//! Every failure the engine can produce is converted into one of these
//! variants before it crosses a task boundary; executors never panic or
//! propagate raw `io::Error` values to observers.

use std::path::{Path, PathBuf};

/// Main error type for Porter operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed on a specific path
    #[error("I/O error on '{path}': {message}")]
    Io {
        /// Path the failing syscall was applied to
        path: PathBuf,
        /// Message from the underlying I/O error
        message: String,
    },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found
        path: PathBuf,
    },

    /// Permission denied
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path to the file with permission issues
        path: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Volume lookup error
    #[error("Volume lookup error: {message}")]
    VolumeLookup {
        /// Error message describing the volume lookup issue
        message: String,
    },

    /// External command failed
    #[error("Command failed: {message}")]
    Command {
        /// Error message describing the command failure
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors, including missing files and permissions
    Io,
    /// Configuration errors
    Config,
    /// Volume lookup errors
    VolumeLookup,
    /// External command errors
    Command,
    /// Cancellation
    Cancelled,
    /// Timeout
    Timeout,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::FileNotFound { .. } | Self::PermissionDenied { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::VolumeLookup { .. } => ErrorKind::VolumeLookup,
            Self::Command { .. } => ErrorKind::Command,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check whether this error is a permission failure
    ///
    /// Surfaced distinctly so observers can offer permission-specific
    /// remediation.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Check whether this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify an `io::Error` for a known path
    ///
    /// Maps `NotFound` and `PermissionDenied` to their dedicated variants
    /// so they survive the conversion to a message string.
    pub fn io<P: AsRef<Path>>(path: P, error: &std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io {
                path,
                message: error.to_string(),
            },
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new volume lookup error
    pub fn volume_lookup<S: Into<String>>(message: S) -> Self {
        Self::VolumeLookup {
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: error.to_string(),
        }
    }
}
