//! Device state behind descriptors: the terminal, FIFOs, pipes and event
//! sources, plus the ioctl handlers for the first two.

use core_types::terminal::LocalFlags;
use core_types::{Errno, EventMask, Termios, Winsize};
use host_api::ioctl::{
    FIFOSCLOSERM, FIFOSKERNR, FIFOSKERNW, TCGETS, TCSETS, WGETGS, WGETRB, WGETRH,
};
use host_api::HostError;

/// The caller's controlling terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    pub size: Winsize,
    pub termios: Termios,
    pub raw: bool,
    /// Everything written to the terminal so far
    pub output: Vec<u8>,
}

impl TerminalState {
    pub fn new(size: Winsize) -> Self {
        Self {
            size,
            termios: Termios::default(),
            raw: false,
            output: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FifoState {
    pub kernel_write: bool,
    pub kernel_read: bool,
    pub remote_closed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipe {
    pub buffer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub mask: EventMask,
    pub pending: EventMask,
}

impl EventSource {
    pub fn new(mask: EventMask) -> Self {
        Self {
            mask,
            pending: EventMask::empty(),
        }
    }

    /// Marks the subscribed subset of `events` pending.
    pub fn post(&mut self, events: EventMask) {
        self.pending |= events & self.mask;
    }

    /// Returns and clears the pending events.
    pub fn take(&mut self) -> EventMask {
        std::mem::take(&mut self.pending)
    }
}

fn not_a_tty(command: u32) -> HostError {
    HostError::from_code(
        Errno::ENOTTY,
        format!("command {command:#010x} does not apply to this descriptor"),
    )
}

/// Serves a device-control command aimed at the terminal.
pub fn terminal_ioctl(
    terminal: &mut TerminalState,
    command: u32,
    payload: &[u8],
) -> Result<Vec<u8>, HostError> {
    match command {
        WGETGS => Ok(terminal.size.to_bytes().to_vec()),
        WGETRH => {
            terminal.termios.make_raw();
            terminal.raw = true;
            Ok(Vec::new())
        }
        WGETRB => {
            terminal.termios = Termios::default();
            terminal.raw = false;
            Ok(Vec::new())
        }
        TCGETS => Ok(terminal.termios.to_bytes().to_vec()),
        TCSETS => {
            let termios = Termios::from_bytes(payload).ok_or_else(|| {
                HostError::from_code(Errno::EINVAL, "short termios payload")
            })?;
            terminal.termios = termios;
            terminal.raw = !termios.lflag.contains(LocalFlags::ICANON);
            Ok(Vec::new())
        }
        other => Err(not_a_tty(other)),
    }
}

/// Serves a device-control command aimed at a FIFO. The argument is a
/// little-endian `i32`; any nonzero value enables.
pub fn fifo_ioctl(fifo: &mut FifoState, command: u32, payload: &[u8]) -> Result<Vec<u8>, HostError> {
    let enabled = match payload {
        [a, b, c, d] => i32::from_le_bytes([*a, *b, *c, *d]) != 0,
        _ => return Err(HostError::from_code(Errno::EINVAL, "FIFO argument is 4 bytes")),
    };
    match command {
        FIFOSKERNW => fifo.kernel_write = enabled,
        FIFOSKERNR => fifo.kernel_read = enabled,
        FIFOSCLOSERM => fifo.remote_closed = true,
        other => return Err(not_a_tty(other)),
    }
    Ok(Vec::new())
}
