//! Descriptor, process and exit-status primitives

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Descriptor number inside a process's descriptor table.
///
/// Signed so that negative values coming from callers can be detected and
/// rejected instead of wrapping into a huge unsigned slot.
pub type RawFd = i32;

/// Process identifier assigned by the host.
pub type Pid = i32;

/// Exit status of a finished process.
pub type ExitCode = i32;

/// Standard input slot
pub const STDIN_FILENO: RawFd = 0;
/// Standard output slot
pub const STDOUT_FILENO: RawFd = 1;
/// Standard error slot
pub const STDERR_FILENO: RawFd = 2;

bitflags! {
    /// Extended descriptor flags understood by the host.
    ///
    /// The low bits are shared with the regular fdflags word; the extended
    /// flags live in [`FdFlags::EXTENDED_MASK`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FdFlags: u16 {
        /// Append mode
        const APPEND = 0x0001;
        /// Synchronized data writes
        const DSYNC = 0x0002;
        /// Non-blocking mode
        const NONBLOCK = 0x0004;
        /// Synchronized reads
        const RSYNC = 0x0008;
        /// Synchronized writes
        const SYNC = 0x0010;
        /// Marks a word that carries extended flags
        const CTRL_BIT = 0x0020;
        /// Close the descriptor in spawned children
        const CLOEXEC = 0x0040;
    }
}

impl FdFlags {
    /// Bits reserved for extended flags.
    pub const EXTENDED_MASK: u16 = 0xffc0;

    /// Returns only the extended portion of the flag word.
    pub fn extended(self) -> FdFlags {
        FdFlags::from_bits_truncate(self.bits() & Self::EXTENDED_MASK)
    }

    /// Whether the descriptor survives a spawn.
    pub fn is_inherited(self) -> bool {
        !self.contains(FdFlags::CLOEXEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values() {
        assert_eq!(FdFlags::CTRL_BIT.bits(), 0x0020);
        assert_eq!(FdFlags::CLOEXEC.bits(), 0x0040);
        assert_eq!(FdFlags::EXTENDED_MASK, 0xffc0);
    }

    #[test]
    fn test_extended_strips_base_flags() {
        let flags = FdFlags::APPEND | FdFlags::NONBLOCK | FdFlags::CLOEXEC;
        assert_eq!(flags.extended(), FdFlags::CLOEXEC);
    }

    #[test]
    fn test_cloexec_not_inherited() {
        assert!(FdFlags::empty().is_inherited());
        assert!(FdFlags::APPEND.is_inherited());
        assert!(!FdFlags::CLOEXEC.is_inherited());
    }

    #[test]
    fn test_flags_serde() {
        let flags = FdFlags::CLOEXEC | FdFlags::APPEND;
        let json = serde_json::to_string(&flags).unwrap();
        let back: FdFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
