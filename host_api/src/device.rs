//! Device control facade
//!
//! Applies command numbers from [`crate::ioctl`] to an open descriptor.
//! The client does not check a command's size field against the buffer it
//! is given; that is the host's call.

use crate::ioctl::{
    IoctlCommand, FIFOSCLOSERM, FIFOSKERNR, FIFOSKERNW, TCGETS, TCSETS, WGETGS, WGETRB, WGETRH,
};
use crate::{HostApi, HostError};
use core_types::{RawFd, Termios, Winsize};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// When a `tcsetattr` change takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TcsetattrAction {
    /// Immediately
    Now = 0,
    /// After pending output is written
    Drain = 1,
    /// After pending output is written, discarding pending input
    Flush = 2,
}

/// Issues a device command on `fd`.
///
/// For write-direction commands the contents of `buf` are sent to the host.
/// For read-direction commands the bytes the host returns are copied back
/// into `buf`, up to the shorter of the two lengths.
pub fn ioctl<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    command: u32,
    buf: Option<&mut [u8]>,
) -> Result<(), HostError> {
    host.limits().check_fd(fd)?;
    let decoded = IoctlCommand::decode(command);
    let direction = decoded.direction();
    debug!(fd, command, decoded = %decoded, "ioctl");

    let outgoing = match &buf {
        Some(buf) if direction.writes() => buf.to_vec(),
        _ => Vec::new(),
    };
    let reply = host.ioctl(fd, command, &outgoing)?;

    if direction.reads() {
        if let Some(buf) = buf {
            let len = buf.len().min(reply.len());
            buf[..len].copy_from_slice(&reply[..len]);
        }
    }
    Ok(())
}

/// Terminal geometry of `fd`.
pub fn window_size<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<Winsize, HostError> {
    let mut buf = [0u8; Winsize::SIZE];
    ioctl(host, fd, WGETGS, Some(&mut buf))?;
    Ok(Winsize::from_bytes(&buf).unwrap_or_default())
}

pub fn enter_raw_mode<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<(), HostError> {
    ioctl(host, fd, WGETRH, None)
}

pub fn enter_cooked_mode<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<(), HostError> {
    ioctl(host, fd, WGETRB, None)
}

/// Switches host-side writing into the FIFO on (`true`) or off.
pub fn fifo_set_kernel_write<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    enabled: bool,
) -> Result<(), HostError> {
    let mut arg = i32::from(enabled).to_le_bytes();
    ioctl(host, fd, FIFOSKERNW, Some(&mut arg))
}

/// Switches host-side reading from the FIFO on (`true`) or off.
pub fn fifo_set_kernel_read<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    enabled: bool,
) -> Result<(), HostError> {
    let mut arg = i32::from(enabled).to_le_bytes();
    ioctl(host, fd, FIFOSKERNR, Some(&mut arg))
}

pub fn fifo_close_remote<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<(), HostError> {
    let mut arg = 0i32.to_le_bytes();
    ioctl(host, fd, FIFOSCLOSERM, Some(&mut arg))
}

pub fn tcgetattr<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<Termios, HostError> {
    let mut buf = [0u8; Termios::SIZE];
    ioctl(host, fd, TCGETS, Some(&mut buf))?;
    Termios::from_bytes(&buf)
        .ok_or_else(|| HostError::Transport("short termios reply".to_string()))
}

/// Only [`TcsetattrAction::Now`] is supported; the others fail with
/// `ENOTSUP` before anything is sent.
pub fn tcsetattr<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    action: TcsetattrAction,
    termios: &Termios,
) -> Result<(), HostError> {
    if action != TcsetattrAction::Now {
        return Err(HostError::unsupported(format!(
            "tcsetattr action {:?}",
            action
        )));
    }
    let mut buf = termios.to_bytes();
    ioctl(host, fd, TCSETS, Some(&mut buf))
}
