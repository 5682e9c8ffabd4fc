//! Descriptor control
//!
//! Fcntl commands are a closed enum carried as their own request variant.
//! They are never packed into a device command number, so the two command
//! spaces cannot collide.

use crate::{HostApi, HostError};
use core_types::{FdFlags, RawFd};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FcntlCommand {
    /// Move the descriptor to the lowest free slot at or above `min_fd`
    MoveFd { min_fd: RawFd },
    GetFdFlags,
    SetFdFlags { flags: FdFlags },
}

/// Issues a descriptor-control command.
///
/// `MoveFd` returns the new descriptor, `GetFdFlags` the flag bits and
/// `SetFdFlags` 0.
pub fn fcntl<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    command: FcntlCommand,
) -> Result<i32, HostError> {
    let limits = host.limits();
    limits.check_fd(fd)?;
    if let FcntlCommand::MoveFd { min_fd } = command {
        limits.check_fd(min_fd)?;
    }
    debug!(fd, ?command, "fcntl");
    host.fcntl(fd, command)
}

/// Moves `fd` to the lowest free descriptor at or above `min_fd`.
pub fn move_fd<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    min_fd: RawFd,
) -> Result<RawFd, HostError> {
    fcntl(host, fd, FcntlCommand::MoveFd { min_fd })
}

pub fn get_fd_flags<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<FdFlags, HostError> {
    let bits = fcntl(host, fd, FcntlCommand::GetFdFlags)?;
    Ok(FdFlags::from_bits_retain(bits as u16))
}

pub fn set_fd_flags<H: HostApi + ?Sized>(
    host: &mut H,
    fd: RawFd,
    flags: FdFlags,
) -> Result<(), HostError> {
    fcntl(host, fd, FcntlCommand::SetFdFlags { flags }).map(|_| ())
}
