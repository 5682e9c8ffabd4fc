//! Terminal payloads carried by device-control calls
//!
//! Both types have a fixed little-endian byte layout because they travel as
//! raw ioctl payload buffers, not as structured messages.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Number of control characters in [`Termios::cc`].
pub const NCCS: usize = 32;

/// Terminal geometry, payload of the get-geometry command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Winsize {
    pub rows: u16,
    pub cols: u16,
}

impl Winsize {
    /// Size on the wire, in bytes.
    pub const SIZE: usize = 4;

    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.rows.to_le_bytes());
        out[2..4].copy_from_slice(&self.cols.to_le_bytes());
        out
    }

    /// Decodes a geometry buffer. Returns `None` when the buffer is short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            rows: u16::from_le_bytes([bytes[0], bytes[1]]),
            cols: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

bitflags! {
    /// Input mode flags (`c_iflag`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InputFlags: u32 {
        const IGNBRK = 0o000001;
        const BRKINT = 0o000002;
        const IGNPAR = 0o000004;
        const PARMRK = 0o000010;
        const INPCK = 0o000020;
        const ISTRIP = 0o000040;
        const INLCR = 0o000100;
        const IGNCR = 0o000200;
        const ICRNL = 0o000400;
        const IXON = 0o002000;
        const IXANY = 0o004000;
        const IXOFF = 0o010000;
    }
}

bitflags! {
    /// Output mode flags (`c_oflag`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct OutputFlags: u32 {
        const OPOST = 0o000001;
        const ONLCR = 0o000004;
    }
}

bitflags! {
    /// Control mode flags (`c_cflag`)
    ///
    /// `CSIZE` is a two-bit field; `CS5`..`CS8` are values within it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ControlFlags: u32 {
        const CSIZE = 0o000060;
        const CS6 = 0o000020;
        const CS7 = 0o000040;
        const CS8 = 0o000060;
        const CSTOPB = 0o000100;
        const CREAD = 0o000200;
        const PARENB = 0o000400;
        const PARODD = 0o001000;
        const HUPCL = 0o002000;
        const CLOCAL = 0o004000;
    }
}

bitflags! {
    /// Local mode flags (`c_lflag`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct LocalFlags: u32 {
        const ISIG = 0o000001;
        const ICANON = 0o000002;
        const ECHO = 0o000010;
        const ECHOE = 0o000020;
        const ECHOK = 0o000040;
        const ECHONL = 0o000100;
        const NOFLSH = 0o000200;
        const TOSTOP = 0o000400;
        const IEXTEN = 0o100000;
    }
}

/// Terminal attributes, payload of the termios get/set commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termios {
    pub iflag: InputFlags,
    pub oflag: OutputFlags,
    pub cflag: ControlFlags,
    pub lflag: LocalFlags,
    pub line: u8,
    pub cc: [u8; NCCS],
    pub ispeed: u32,
    pub ospeed: u32,
}

impl Default for Termios {
    /// Cooked-mode defaults of a freshly opened terminal.
    fn default() -> Self {
        Self {
            iflag: InputFlags::ICRNL | InputFlags::IXON,
            oflag: OutputFlags::OPOST | OutputFlags::ONLCR,
            cflag: ControlFlags::CS8 | ControlFlags::CREAD,
            lflag: LocalFlags::ISIG
                | LocalFlags::ICANON
                | LocalFlags::ECHO
                | LocalFlags::ECHOE
                | LocalFlags::ECHOK
                | LocalFlags::IEXTEN,
            line: 0,
            cc: [0; NCCS],
            ispeed: 0,
            ospeed: 0,
        }
    }
}

impl Termios {
    /// Size on the wire, in bytes (including 3 bytes of padding after `cc`).
    pub const SIZE: usize = 60;

    const CC_OFFSET: usize = 17;
    const ISPEED_OFFSET: usize = 52;
    const OSPEED_OFFSET: usize = 56;

    /// Switches the attributes to raw mode: no input translation, no output
    /// post-processing, no echo, no canonical line editing, 8-bit characters.
    pub fn make_raw(&mut self) {
        self.iflag.remove(
            InputFlags::IGNBRK
                | InputFlags::BRKINT
                | InputFlags::PARMRK
                | InputFlags::ISTRIP
                | InputFlags::INLCR
                | InputFlags::IGNCR
                | InputFlags::ICRNL
                | InputFlags::IXON,
        );
        self.oflag.remove(OutputFlags::OPOST);
        self.lflag.remove(
            LocalFlags::ECHO
                | LocalFlags::ECHONL
                | LocalFlags::ICANON
                | LocalFlags::ISIG
                | LocalFlags::IEXTEN,
        );
        self.cflag.remove(ControlFlags::CSIZE | ControlFlags::PARENB);
        self.cflag.insert(ControlFlags::CS8);
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.iflag.bits().to_le_bytes());
        out[4..8].copy_from_slice(&self.oflag.bits().to_le_bytes());
        out[8..12].copy_from_slice(&self.cflag.bits().to_le_bytes());
        out[12..16].copy_from_slice(&self.lflag.bits().to_le_bytes());
        out[16] = self.line;
        out[Self::CC_OFFSET..Self::CC_OFFSET + NCCS].copy_from_slice(&self.cc);
        out[Self::ISPEED_OFFSET..Self::ISPEED_OFFSET + 4]
            .copy_from_slice(&self.ispeed.to_le_bytes());
        out[Self::OSPEED_OFFSET..Self::OSPEED_OFFSET + 4]
            .copy_from_slice(&self.ospeed.to_le_bytes());
        out
    }

    /// Decodes an attribute buffer, keeping unknown flag bits.
    /// Returns `None` when the buffer is short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let word = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        let mut cc = [0u8; NCCS];
        cc.copy_from_slice(&bytes[Self::CC_OFFSET..Self::CC_OFFSET + NCCS]);
        Some(Self {
            iflag: InputFlags::from_bits_retain(word(0)),
            oflag: OutputFlags::from_bits_retain(word(4)),
            cflag: ControlFlags::from_bits_retain(word(8)),
            lflag: LocalFlags::from_bits_retain(word(12)),
            line: bytes[16],
            cc,
            ispeed: word(Self::ISPEED_OFFSET),
            ospeed: word(Self::OSPEED_OFFSET),
        })
    }
}
