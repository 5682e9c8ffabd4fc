//! Working directory, environment, tty and process queries

use crate::error::{check_no_nul, check_path};
use crate::{HostApi, HostError};
use core_types::{Errno, Pid, RawFd, Signal};
use tracing::debug;

/// First buffer size offered to the host by [`getcwd`].
pub const GETCWD_INITIAL_LEN: usize = 256;
/// Largest buffer [`getcwd`] offers before giving up.
pub const GETCWD_MAX_LEN: usize = 65536;

pub fn chdir<H: HostApi + ?Sized>(host: &mut H, path: &[u8]) -> Result<(), HostError> {
    check_path("directory", path)?;
    debug!(path = %String::from_utf8_lossy(path), "chdir");
    host.chdir(path)
}

/// Current working directory.
///
/// Starts with a 256-byte buffer and doubles it each time the host answers
/// `ENOBUFS`. Past 65536 bytes the call fails with `ENAMETOOLONG`.
pub fn getcwd<H: HostApi + ?Sized>(host: &mut H) -> Result<Vec<u8>, HostError> {
    let mut buf_len = GETCWD_INITIAL_LEN;
    while buf_len <= GETCWD_MAX_LEN {
        debug!(buf_len, "getcwd");
        match host.getcwd(buf_len) {
            Err(err) if err.code() == Errno::ENOBUFS => buf_len *= 2,
            other => return other,
        }
    }
    Err(HostError::from_code(
        Errno::ENAMETOOLONG,
        format!("working directory longer than {} bytes", GETCWD_MAX_LEN),
    ))
}

pub fn isatty<H: HostApi + ?Sized>(host: &mut H, fd: RawFd) -> Result<bool, HostError> {
    host.limits().check_fd(fd)?;
    debug!(fd, "isatty");
    host.isatty(fd)
}

/// Sets `name` to `value`, or unsets it when `value` is `None`.
pub fn set_env<H: HostApi + ?Sized>(
    host: &mut H,
    name: &[u8],
    value: Option<&[u8]>,
) -> Result<(), HostError> {
    check_path("environment name", name)?;
    if name.contains(&b'=') {
        return Err(HostError::InvalidArgument(
            "environment name contains '='".to_string(),
        ));
    }
    if let Some(value) = value {
        check_no_nul("environment value", value)?;
    }
    debug!(var = %String::from_utf8_lossy(name), unset = value.is_none(), "set_env");
    host.set_env(name, value)
}

pub fn getpid<H: HostApi + ?Sized>(host: &mut H) -> Result<Pid, HostError> {
    debug!("getpid");
    host.getpid()
}

pub fn clean_inodes<H: HostApi + ?Sized>(host: &mut H) -> Result<(), HostError> {
    debug!("clean_inodes");
    host.clean_inodes()
}

/// Delivers `signal` to `pid`.
pub fn kill<H: HostApi + ?Sized>(host: &mut H, pid: Pid, signal: Signal) -> Result<(), HostError> {
    if pid <= 0 {
        return Err(HostError::InvalidArgument(format!(
            "process groups are not addressable: pid {}",
            pid
        )));
    }
    debug!(pid, %signal, "kill");
    host.kill(pid, signal)
}
