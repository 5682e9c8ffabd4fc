//! Host call error types

use core_types::{Errno, RawFd};
use thiserror::Error;

/// Errors that can occur when issuing a host call
///
/// Shape errors (`InvalidField`, `InvalidDescriptor`, `InvalidArgument`) are
/// raised on the client before anything crosses the boundary. The remaining
/// variants carry the exact errno the host reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// A command-number field does not fit its bit width
    #[error("Field {field} out of range: {value} > {max}")]
    InvalidField {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// Descriptor outside `[0, max_fd)`
    #[error("Invalid descriptor {fd} (max {max_fd})")]
    InvalidDescriptor { fd: RawFd, max_fd: RawFd },

    /// Malformed request shape
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Too many entries, no free process slots, out of memory
    #[error("Resource exhausted ({code}): {message}")]
    ResourceExhausted { code: Errno, message: String },

    /// Path, device or process absent
    #[error("Not found ({code}): {message}")]
    NotFound { code: Errno, message: String },

    #[error("Permission denied ({code}): {message}")]
    PermissionDenied { code: Errno, message: String },

    /// Any other host failure
    #[error("Host rejected call ({code}): {message}")]
    HostRejected { code: Errno, message: String },

    /// Wire encode/decode or transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl HostError {
    /// Builds the error for a host-reported code, classifying it by errno.
    pub fn from_code(code: Errno, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Errno::ENOENT | Errno::ENODEV | Errno::ESRCH => HostError::NotFound { code, message },
            Errno::EACCES | Errno::EPERM => HostError::PermissionDenied { code, message },
            Errno::E2BIG | Errno::EAGAIN | Errno::EMFILE | Errno::ENOMEM => {
                HostError::ResourceExhausted { code, message }
            }
            _ => HostError::HostRejected { code, message },
        }
    }

    /// Error number equivalent of this error.
    pub fn code(&self) -> Errno {
        match self {
            HostError::InvalidField { .. } | HostError::InvalidArgument(_) => Errno::EINVAL,
            HostError::InvalidDescriptor { .. } => Errno::EBADF,
            HostError::ResourceExhausted { code, .. }
            | HostError::NotFound { code, .. }
            | HostError::PermissionDenied { code, .. }
            | HostError::HostRejected { code, .. } => *code,
            HostError::Transport(_) => Errno::EIO,
        }
    }

    /// Shorthand for an operation the host (or this layer) does not support.
    pub fn unsupported(message: impl Into<String>) -> Self {
        HostError::HostRejected {
            code: Errno::ENOTSUP,
            message: message.into(),
        }
    }
}

/// Rejects an empty or NUL-containing path.
pub fn check_path(what: &str, path: &[u8]) -> Result<(), HostError> {
    if path.is_empty() {
        return Err(HostError::InvalidArgument(format!("{} is empty", what)));
    }
    check_no_nul(what, path)
}

/// Rejects a byte string containing an embedded NUL.
pub fn check_no_nul(what: &str, bytes: &[u8]) -> Result<(), HostError> {
    if bytes.contains(&0) {
        return Err(HostError::InvalidArgument(format!(
            "{} contains a NUL byte",
            what
        )));
    }
    Ok(())
}
