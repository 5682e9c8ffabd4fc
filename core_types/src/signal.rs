//! Signals deliverable through `kill`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signal numbers understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Signal {
    Hup = 1,
    Int = 2,
    Quit = 3,
    Abrt = 6,
    Kill = 9,
    Usr1 = 10,
    Segv = 11,
    Usr2 = 12,
    Pipe = 13,
    Alrm = 14,
    Term = 15,
    Chld = 16,
    Cont = 17,
    Stop = 18,
    Tstp = 19,
    Winch = 28,
}

impl Signal {
    /// Converts a raw signal number.
    pub fn from_raw(raw: u8) -> Option<Self> {
        let signal = match raw {
            1 => Signal::Hup,
            2 => Signal::Int,
            3 => Signal::Quit,
            6 => Signal::Abrt,
            9 => Signal::Kill,
            10 => Signal::Usr1,
            11 => Signal::Segv,
            12 => Signal::Usr2,
            13 => Signal::Pipe,
            14 => Signal::Alrm,
            15 => Signal::Term,
            16 => Signal::Chld,
            17 => Signal::Cont,
            18 => Signal::Stop,
            19 => Signal::Tstp,
            28 => Signal::Winch,
            _ => return None,
        };
        Some(signal)
    }

    /// Raw signal number.
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Whether the default action ends the receiving process.
    pub fn terminates_by_default(self) -> bool {
        !matches!(
            self,
            Signal::Chld | Signal::Cont | Signal::Stop | Signal::Tstp | Signal::Winch
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{:?}({})", self, self.raw())
    }
}
