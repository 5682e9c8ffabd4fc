//! The host boundary trait

use crate::{
    AbiLimits, FcntlCommand, HostCapabilities, HostError, MountRequest, SpawnOutcome,
    SpawnRequest,
};
use core_types::{DeviceId, EventMask, Pid, RawFd, Signal};

/// One method per boundary call
///
/// Every method is a single synchronous request: the caller blocks until the
/// host has answered. The trait is implemented by the simulated host and by
/// [`crate::HostCallClient`], which forwards each call over a transport.
///
/// Methods here do the raw call only. Shape validation lives in the facade
/// functions ([`crate::device`], [`crate::process`], ...) and in the request
/// types, so that nothing malformed reaches an implementation through them.
///
/// # Example
///
/// ```
/// use host_api::{HostApi, HostError};
///
/// fn print_cwd<H: HostApi>(host: &mut H) -> Result<(), HostError> {
///     let cwd = host_api::process::getcwd(host)?;
///     println!("{}", String::from_utf8_lossy(&cwd));
///     Ok(())
/// }
/// ```
pub trait HostApi {
    /// Limits this side enforces on requests. Local, not a boundary call.
    fn limits(&self) -> AbiLimits;

    /// Optional extensions the host exposes.
    fn capabilities(&mut self) -> Result<HostCapabilities, HostError>;

    fn chdir(&mut self, path: &[u8]) -> Result<(), HostError>;

    /// Returns the working directory if it fits `buf_len` bytes including
    /// the terminating NUL, `ENOBUFS` otherwise.
    fn getcwd(&mut self, buf_len: usize) -> Result<Vec<u8>, HostError>;

    fn isatty(&mut self, fd: RawFd) -> Result<bool, HostError>;

    /// Sets a variable, or unsets it when `value` is `None`.
    fn set_env(&mut self, name: &[u8], value: Option<&[u8]>) -> Result<(), HostError>;

    fn getpid(&mut self) -> Result<Pid, HostError>;

    /// Asks the host to drop filesystem bookkeeping nothing refers to.
    fn clean_inodes(&mut self) -> Result<(), HostError>;

    /// Spawns a process. Redirects are applied in order; any failure aborts
    /// the whole spawn.
    fn spawn(&mut self, request: &SpawnRequest<'_>) -> Result<SpawnOutcome, HostError>;

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), HostError>;

    /// Device command on `fd`. `payload` holds the bytes sent to the host;
    /// the reply holds the bytes the host returns for read-direction
    /// commands.
    fn ioctl(&mut self, fd: RawFd, command: u32, payload: &[u8]) -> Result<Vec<u8>, HostError>;

    fn fcntl(&mut self, fd: RawFd, command: FcntlCommand) -> Result<i32, HostError>;

    fn mount(&mut self, request: &MountRequest<'_>) -> Result<(), HostError>;

    fn umount(&mut self, path: &[u8]) -> Result<(), HostError>;

    fn mknod(&mut self, path: &[u8], device: DeviceId) -> Result<(), HostError>;

    /// Descriptor that becomes readable when an event in `mask` is pending.
    fn event_source_fd(&mut self, mask: EventMask) -> Result<RawFd, HostError>;

    /// Routes interrupt delivery to an event-source descriptor.
    fn attach_sigint(&mut self, fd: RawFd) -> Result<(), HostError>;
}
