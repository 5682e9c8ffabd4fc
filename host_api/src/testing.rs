//! Recording host for facade unit tests

use crate::{
    AbiLimits, FcntlCommand, HostApi, HostCapabilities, HostError, MountRequest, MountSpec,
    SpawnOutcome, SpawnRequest, SpawnSpec,
};
use core_types::{DeviceId, Errno, EventMask, Pid, RawFd, Signal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Capabilities,
    Chdir(Vec<u8>),
    Getcwd(usize),
    Isatty(RawFd),
    SetEnv(Vec<u8>, Option<Vec<u8>>),
    Getpid,
    CleanInodes,
    Spawn(SpawnSpec),
    Kill(Pid, Signal),
    Ioctl(RawFd, u32, Vec<u8>),
    Fcntl(RawFd, FcntlCommand),
    Mount(MountSpec),
    Umount(Vec<u8>),
    Mknod(Vec<u8>, DeviceId),
    EventSourceFd(EventMask),
    AttachSigint(RawFd),
}

/// Records every call and answers from canned fields.
pub struct RecordingHost {
    pub calls: Vec<Call>,
    pub limits: AbiLimits,
    pub capabilities: HostCapabilities,
    pub cwd: Vec<u8>,
    pub ioctl_reply: Vec<u8>,
    pub fcntl_reply: i32,
    pub event_fd: RawFd,
    /// Returned (once) by the next call instead of the canned answer
    pub fail_with: Option<HostError>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            limits: AbiLimits::default(),
            capabilities: HostCapabilities::default(),
            cwd: b"/".to_vec(),
            ioctl_reply: Vec::new(),
            fcntl_reply: 0,
            event_fd: 3,
            fail_with: None,
        }
    }

    fn record(&mut self, call: Call) -> Result<(), HostError> {
        self.calls.push(call);
        match self.fail_with.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl HostApi for RecordingHost {
    fn limits(&self) -> AbiLimits {
        self.limits
    }

    fn capabilities(&mut self) -> Result<HostCapabilities, HostError> {
        self.record(Call::Capabilities)?;
        Ok(self.capabilities)
    }

    fn chdir(&mut self, path: &[u8]) -> Result<(), HostError> {
        self.record(Call::Chdir(path.to_vec()))
    }

    fn getcwd(&mut self, buf_len: usize) -> Result<Vec<u8>, HostError> {
        self.record(Call::Getcwd(buf_len))?;
        if self.cwd.len() + 1 > buf_len {
            return Err(HostError::from_code(Errno::ENOBUFS, "buffer too small"));
        }
        Ok(self.cwd.clone())
    }

    fn isatty(&mut self, fd: RawFd) -> Result<bool, HostError> {
        self.record(Call::Isatty(fd))?;
        Ok(fd < 3)
    }

    fn set_env(&mut self, name: &[u8], value: Option<&[u8]>) -> Result<(), HostError> {
        self.record(Call::SetEnv(name.to_vec(), value.map(<[u8]>::to_vec)))
    }

    fn getpid(&mut self) -> Result<Pid, HostError> {
        self.record(Call::Getpid)?;
        Ok(1)
    }

    fn clean_inodes(&mut self) -> Result<(), HostError> {
        self.record(Call::CleanInodes)
    }

    fn spawn(&mut self, request: &SpawnRequest<'_>) -> Result<SpawnOutcome, HostError> {
        self.record(Call::Spawn(request.to_spec()))?;
        Ok(SpawnOutcome { pid: 2, status: 0 })
    }

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), HostError> {
        self.record(Call::Kill(pid, signal))
    }

    fn ioctl(&mut self, fd: RawFd, command: u32, payload: &[u8]) -> Result<Vec<u8>, HostError> {
        self.record(Call::Ioctl(fd, command, payload.to_vec()))?;
        Ok(self.ioctl_reply.clone())
    }

    fn fcntl(&mut self, fd: RawFd, command: FcntlCommand) -> Result<i32, HostError> {
        self.record(Call::Fcntl(fd, command))?;
        Ok(self.fcntl_reply)
    }

    fn mount(&mut self, request: &MountRequest<'_>) -> Result<(), HostError> {
        self.record(Call::Mount(request.to_spec()))
    }

    fn umount(&mut self, path: &[u8]) -> Result<(), HostError> {
        self.record(Call::Umount(path.to_vec()))
    }

    fn mknod(&mut self, path: &[u8], device: DeviceId) -> Result<(), HostError> {
        self.record(Call::Mknod(path.to_vec(), device))
    }

    fn event_source_fd(&mut self, mask: EventMask) -> Result<RawFd, HostError> {
        self.record(Call::EventSourceFd(mask))?;
        Ok(self.event_fd)
    }

    fn attach_sigint(&mut self, fd: RawFd) -> Result<(), HostError> {
        self.record(Call::AttachSigint(fd))
    }
}
