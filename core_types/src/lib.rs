//! # Core Types
//!
//! This crate defines the plain values exchanged across the host boundary.
//!
//! ## Philosophy
//!
//! Core types are designed with these principles:
//! - **Values, not handles**: Nothing here owns a host resource. A [`RawFd`]
//!   is just a number; the host decides what it refers to.
//! - **Closed sets are enums**: Signals and directions are enumerations, so an
//!   unknown value is rejected at the edge instead of travelling inward.
//! - **Bit layouts are explicit**: Flag words use `bitflags`, and packed
//!   identifiers expose their shifts as constants.
//!
//! ## Key Types
//!
//! - [`RawFd`], [`Pid`], [`ExitCode`]: Integer handles used by every call
//! - [`FdFlags`]: Extended descriptor flags (`CLOEXEC`, ...)
//! - [`Errno`]: Host error numbering carried back with failed calls
//! - [`Signal`]: Signals deliverable with `kill`
//! - [`DeviceId`]: `mkdev`-style packed device identifiers
//! - [`Winsize`], [`Termios`]: Terminal payloads for device control
//! - [`EventMask`]: Event bits for the optional event-source extension

pub mod device;
pub mod errno;
pub mod events;
pub mod fd;
pub mod signal;
pub mod terminal;

pub use device::{mkdev, DeviceId};
pub use errno::Errno;
pub use events::EventMask;
pub use fd::{ExitCode, FdFlags, Pid, RawFd, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
pub use signal::Signal;
pub use terminal::{Termios, Winsize, NCCS};
