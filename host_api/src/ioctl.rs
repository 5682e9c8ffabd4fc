//! Device command numbers
//!
//! A command number packs four fields into 32 bits:
//!
//! | field     | bits  |
//! |-----------|-------|
//! | direction | 30-31 |
//! | size      | 16-29 |
//! | major     | 8-15  |
//! | function  | 0-7   |
//!
//! Every number in this layer, including the well-known constants below, is
//! built by [`pack`] from the same shift table.
//!
//! Major 0 is a placeholder for FIFOs, which have no device class of their
//! own. A real device registered under major 0 would share the FIFO command
//! space; the FIFO commands carry the write direction to keep them apart from
//! plain `_IO` numbers, but nothing here prevents the overlap.

use crate::HostError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DIRECTION_SHIFT: u32 = 30;
pub const SIZE_SHIFT: u32 = 16;
pub const MAJOR_SHIFT: u32 = 8;
pub const FUNCTION_SHIFT: u32 = 0;

pub const DIRECTION_MASK: u32 = 0xC000_0000;
pub const SIZE_MASK: u32 = 0x3FFF_0000;
pub const MAJOR_MASK: u32 = 0x0000_FF00;
pub const FUNCTION_MASK: u32 = 0x0000_00FF;

pub const MAX_DIRECTION: u32 = 3;
pub const MAX_SIZE: u32 = 0x3FFF;
pub const MAX_MAJOR: u32 = 0xFF;
pub const MAX_FUNCTION: u32 = 0xFF;

/// Device class of FIFOs (placeholder, see module docs)
pub const FIFO_MAJOR: u8 = 0;
/// Device class of terminal attribute commands
pub const TERMIOS_MAJOR: u8 = 1;
/// Device class of the host terminal
pub const TERMINAL_MAJOR: u8 = 2;

/// Payload transfer direction, seen from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// No payload
    None = 0,
    /// Caller sends bytes to the host
    Write = 1,
    /// Host fills the caller's buffer
    Read = 2,
    ReadWrite = 3,
}

impl Direction {
    /// Validates a raw two-bit direction value.
    pub fn from_raw(raw: u32) -> Result<Self, HostError> {
        if raw > MAX_DIRECTION {
            return Err(HostError::InvalidField {
                field: "direction",
                value: raw,
                max: MAX_DIRECTION,
            });
        }
        Ok(Self::from_bits(raw))
    }

    const fn from_bits(bits: u32) -> Self {
        match bits & MAX_DIRECTION {
            0 => Direction::None,
            1 => Direction::Write,
            2 => Direction::Read,
            _ => Direction::ReadWrite,
        }
    }

    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// True when bytes flow from the caller to the host.
    pub fn writes(self) -> bool {
        matches!(self, Direction::Write | Direction::ReadWrite)
    }

    /// True when bytes flow from the host back into the caller's buffer.
    pub fn reads(self) -> bool {
        matches!(self, Direction::Read | Direction::ReadWrite)
    }
}

/// Decoded form of a command number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoctlCommand {
    direction: Direction,
    size: u16,
    major: u8,
    function: u8,
}

impl IoctlCommand {
    /// Builds a command, rejecting any field that does not fit its width.
    pub fn new(
        direction: Direction,
        size: u32,
        major: u32,
        function: u32,
    ) -> Result<Self, HostError> {
        let size = check_field("size", size, MAX_SIZE)?;
        let major = check_field("major", major, MAX_MAJOR)?;
        let function = check_field("function", function, MAX_FUNCTION)?;
        Ok(Self {
            direction,
            size: size as u16,
            major: major as u8,
            function: function as u8,
        })
    }

    /// Splits a command number into its fields. Never fails.
    pub const fn decode(number: u32) -> Self {
        Self {
            direction: Direction::from_bits((number & DIRECTION_MASK) >> DIRECTION_SHIFT),
            size: ((number & SIZE_MASK) >> SIZE_SHIFT) as u16,
            major: ((number & MAJOR_MASK) >> MAJOR_SHIFT) as u8,
            function: ((number & FUNCTION_MASK) >> FUNCTION_SHIFT) as u8,
        }
    }

    /// Packed command number.
    pub const fn number(&self) -> u32 {
        pack(
            self.direction,
            self.size as u32,
            self.major as u32,
            self.function as u32,
        )
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Payload size in bytes. Zero means the size is implied by the command.
    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn function(&self) -> u8 {
        self.function
    }
}

impl fmt::Display for IoctlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}(major={}, fn={}, size={})",
            self.direction, self.major, self.function, self.size
        )
    }
}

fn check_field(field: &'static str, value: u32, max: u32) -> Result<u32, HostError> {
    if value > max {
        return Err(HostError::InvalidField { field, value, max });
    }
    Ok(value)
}

/// Packs already range-checked fields. Out-of-range inputs are masked, so
/// callers outside this module go through [`encode`].
const fn pack(direction: Direction, size: u32, major: u32, function: u32) -> u32 {
    ((direction.raw() << DIRECTION_SHIFT) & DIRECTION_MASK)
        | ((size << SIZE_SHIFT) & SIZE_MASK)
        | ((major << MAJOR_SHIFT) & MAJOR_MASK)
        | ((function << FUNCTION_SHIFT) & FUNCTION_MASK)
}

/// Encodes a command number from its four fields.
pub fn encode(direction: Direction, size: u32, major: u32, function: u32) -> Result<u32, HostError> {
    IoctlCommand::new(direction, size, major, function).map(|command| command.number())
}

/// Decodes a command number into its four fields.
pub fn decode(number: u32) -> IoctlCommand {
    IoctlCommand::decode(number)
}

/// Get terminal geometry ([`core_types::Winsize`])
pub const WGETGS: u32 = pack(Direction::Read, 4, TERMINAL_MAJOR as u32, 0);
/// Put the terminal in raw mode
pub const WGETRH: u32 = pack(Direction::None, 0, TERMINAL_MAJOR as u32, 1);
/// Put the terminal back in cooked mode
pub const WGETRB: u32 = pack(Direction::None, 0, TERMINAL_MAJOR as u32, 2);
/// Let the host write into the FIFO
pub const FIFOSKERNW: u32 = pack(Direction::Write, 4, FIFO_MAJOR as u32, 0);
/// Let the host read from the FIFO
pub const FIFOSKERNR: u32 = pack(Direction::Write, 4, FIFO_MAJOR as u32, 1);
/// Close the remote end of the FIFO
pub const FIFOSCLOSERM: u32 = pack(Direction::Write, 4, FIFO_MAJOR as u32, 2);
/// Get terminal attributes ([`core_types::Termios`])
pub const TCGETS: u32 = pack(Direction::Read, 0, TERMIOS_MAJOR as u32, 1);
/// Set terminal attributes
pub const TCSETS: u32 = pack(Direction::Write, 0, TERMIOS_MAJOR as u32, 2);
