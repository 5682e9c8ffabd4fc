//! Packed device identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits reserved for the minor number.
pub const MINOR_BITS: u32 = 20;

const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;

/// Device identifier composed from a major and a minor number.
///
/// The major sits in the high 12 bits above a 20-bit minor. Composition is
/// a pure bit operation; overlapping inputs are not detected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Wraps an already packed identifier.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the packed value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Major number (device class).
    pub const fn major(self) -> u32 {
        self.0 >> MINOR_BITS
    }

    /// Minor number (instance within the class).
    pub const fn minor(self) -> u32 {
        self.0 & MINOR_MASK
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

/// Composes a device identifier: `(major << 20) | minor`.
pub const fn mkdev(major: u32, minor: u32) -> DeviceId {
    DeviceId((major << MINOR_BITS) | minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdev_values() {
        assert_eq!(mkdev(2, 0).raw(), 2 << 20);
        assert_eq!(mkdev(0, 5).raw(), 5);
        assert_eq!(mkdev(1, 3).raw(), (1 << 20) | 3);
    }

    #[test]
    fn test_split() {
        let dev = mkdev(7, 42);
        assert_eq!(dev.major(), 7);
        assert_eq!(dev.minor(), 42);
        assert_eq!(dev.to_string(), "7:42");
    }

    #[test]
    fn test_overlap_is_not_validated() {
        // A minor wider than 20 bits bleeds into the major field.
        let dev = mkdev(0, 1 << 20);
        assert_eq!(dev.major(), 1);
        assert_eq!(dev.minor(), 0);
    }
}
