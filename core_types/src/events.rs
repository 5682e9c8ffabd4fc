//! Event bits for the optional event-source extension

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Events a host may signal through an event-source descriptor.
    ///
    /// Travels as a 4-byte little-endian word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EventMask: u32 {
        /// Terminal window size changed
        const WINCH = 1 << 0;
        /// Interrupt requested (Ctrl-C)
        const SIGINT = 1 << 1;
    }
}

impl EventMask {
    /// Number of defined events.
    pub const EVENTS_NUM: usize = 2;
    /// Size of the mask on the wire, in bytes.
    pub const MASK_SIZE: usize = 4;

    /// Encodes the mask as it is read from an event-source descriptor.
    pub fn to_le_bytes(self) -> [u8; Self::MASK_SIZE] {
        self.bits().to_le_bytes()
    }

    /// Decodes a mask read from an event-source descriptor, keeping unknown bits.
    pub fn from_le_bytes(bytes: [u8; Self::MASK_SIZE]) -> Self {
        EventMask::from_bits_retain(u32::from_le_bytes(bytes))
    }
}
