//! Host error numbering

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error number reported by the host alongside a failed call.
///
/// The numbering follows the host runtime's errno table, not the Linux one.
/// Unknown numbers are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Errno(u16);

impl Errno {
    pub const ESUCCESS: Errno = Errno(0);
    pub const E2BIG: Errno = Errno(1);
    pub const EACCES: Errno = Errno(2);
    pub const EAGAIN: Errno = Errno(6);
    pub const EBADF: Errno = Errno(8);
    pub const EBUSY: Errno = Errno(10);
    pub const EEXIST: Errno = Errno(20);
    pub const EINVAL: Errno = Errno(28);
    pub const EIO: Errno = Errno(29);
    pub const EISDIR: Errno = Errno(31);
    pub const EMFILE: Errno = Errno(33);
    pub const ENAMETOOLONG: Errno = Errno(37);
    pub const ENOBUFS: Errno = Errno(42);
    pub const ENODEV: Errno = Errno(43);
    pub const ENOENT: Errno = Errno(44);
    pub const ENOEXEC: Errno = Errno(45);
    pub const ENOMEM: Errno = Errno(48);
    pub const ENOTDIR: Errno = Errno(54);
    pub const ENOTSUP: Errno = Errno(58);
    pub const ENOTTY: Errno = Errno(59);
    pub const EPERM: Errno = Errno(63);
    pub const EROFS: Errno = Errno(69);
    pub const ESRCH: Errno = Errno(71);

    /// Wraps a raw error number.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw error number.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Symbolic name, if the number is one this layer knows about.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Errno::ESUCCESS => "ESUCCESS",
            Errno::E2BIG => "E2BIG",
            Errno::EACCES => "EACCES",
            Errno::EAGAIN => "EAGAIN",
            Errno::EBADF => "EBADF",
            Errno::EBUSY => "EBUSY",
            Errno::EEXIST => "EEXIST",
            Errno::EINVAL => "EINVAL",
            Errno::EIO => "EIO",
            Errno::EISDIR => "EISDIR",
            Errno::EMFILE => "EMFILE",
            Errno::ENAMETOOLONG => "ENAMETOOLONG",
            Errno::ENOBUFS => "ENOBUFS",
            Errno::ENODEV => "ENODEV",
            Errno::ENOENT => "ENOENT",
            Errno::ENOEXEC => "ENOEXEC",
            Errno::ENOMEM => "ENOMEM",
            Errno::ENOTDIR => "ENOTDIR",
            Errno::ENOTSUP => "ENOTSUP",
            Errno::ENOTTY => "ENOTTY",
            Errno::EPERM => "EPERM",
            Errno::EROFS => "EROFS",
            Errno::ESRCH => "ESRCH",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "errno({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_known() {
        assert_eq!(Errno::ENOENT.to_string(), "ENOENT(44)");
    }

    #[test]
    fn test_display_unknown_kept_verbatim() {
        let errno = Errno::from_raw(999);
        assert_eq!(errno.raw(), 999);
        assert!(errno.name().is_none());
        assert_eq!(errno.to_string(), "errno(999)");
    }

    #[test]
    fn test_serde_is_plain_number() {
        let json = serde_json::to_string(&Errno::ENOTSUP).unwrap();
        assert_eq!(json, "58");
    }
}
