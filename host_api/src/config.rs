//! ABI limits shared by the client and the host

use crate::HostError;
use core_types::RawFd;
use serde::{Deserialize, Serialize};

/// Upper bounds a request must respect before it is sent.
///
/// Descriptor and request constructors take these explicitly so tests can
/// run against a smaller table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiLimits {
    /// Descriptors are valid in `[0, max_fd)`
    pub max_fd: RawFd,
    pub max_args: usize,
    pub max_env: usize,
    pub max_redirects: usize,
}

impl Default for AbiLimits {
    fn default() -> Self {
        Self {
            max_fd: 1024,
            max_args: 4096,
            max_env: 4096,
            max_redirects: 1024,
        }
    }
}

impl AbiLimits {
    /// Checks that `fd` lies in `[0, max_fd)`.
    pub fn check_fd(&self, fd: RawFd) -> Result<(), HostError> {
        if fd < 0 || fd >= self.max_fd {
            return Err(HostError::InvalidDescriptor {
                fd,
                max_fd: self.max_fd,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = AbiLimits::default();
        assert_eq!(limits.max_fd, 1024);
        assert_eq!(limits.max_redirects, 1024);
    }

    #[test]
    fn test_fd_bounds() {
        let limits = AbiLimits {
            max_fd: 8,
            ..AbiLimits::default()
        };
        assert!(limits.check_fd(0).is_ok());
        assert!(limits.check_fd(7).is_ok());
        assert_eq!(
            limits.check_fd(8),
            Err(HostError::InvalidDescriptor { fd: 8, max_fd: 8 })
        );
        assert!(limits.check_fd(-1).is_err());
    }
}
