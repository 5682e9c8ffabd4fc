//! Simulated processes and their descriptor tables

use crate::vfs::HostPath;
use core_types::{ExitCode, FdFlags, Pid, RawFd, Signal};
use std::collections::BTreeMap;

/// Scripted behavior of an executable file.
///
/// When spawned, the program writes `stdout` to its fd 1 and `stderr` to its
/// fd 2, optionally echoes everything readable on fd 0 to fd 1, then exits
/// with `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitCode,
    pub copy_stdin: bool,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdout(mut self, bytes: &[u8]) -> Self {
        self.stdout = bytes.to_vec();
        self
    }

    pub fn with_stderr(mut self, bytes: &[u8]) -> Self {
        self.stderr = bytes.to_vec();
        self
    }

    pub fn with_status(mut self, status: ExitCode) -> Self {
        self.status = status;
        self
    }

    /// Behave like `cat`: copy stdin to stdout before the scripted output.
    pub fn copying_stdin(mut self) -> Self {
        self.copy_stdin = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    ReadWrite,
}

impl OpenMode {
    pub fn readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// What a descriptor refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdTarget {
    File { path: HostPath, mode: OpenMode },
    Directory { path: HostPath },
    Terminal,
    PipeRead(u64),
    PipeWrite(u64),
    Fifo { path: HostPath },
    EventSource(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFd {
    pub target: FdTarget,
    pub flags: FdFlags,
}

impl OpenFd {
    pub fn new(target: FdTarget) -> Self {
        Self {
            target,
            flags: FdFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: FdFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(ExitCode),
}

#[derive(Debug, Clone)]
pub struct SimProcess {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub path: HostPath,
    pub args: Vec<Vec<u8>>,
    pub env: BTreeMap<Vec<u8>, Vec<u8>>,
    pub cwd: HostPath,
    pub fds: BTreeMap<RawFd, OpenFd>,
    pub state: ProcessState,
    /// Non-fatal signals delivered so far, oldest first
    pub signals: Vec<Signal>,
    /// Event source receiving interrupts instead of the default action
    pub sigint_target: Option<u64>,
}

impl SimProcess {
    pub fn new(pid: Pid, parent: Option<Pid>, path: HostPath, cwd: HostPath) -> Self {
        Self {
            pid,
            parent,
            path,
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd,
            fds: BTreeMap::new(),
            state: ProcessState::Running,
            signals: Vec::new(),
            sigint_target: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn fd(&self, fd: RawFd) -> Option<&OpenFd> {
        self.fds.get(&fd)
    }

    /// Lowest free descriptor at or above `min`, below `max_fd`.
    pub fn lowest_free_fd(&self, min: RawFd, max_fd: RawFd) -> Option<RawFd> {
        (min.max(0)..max_fd).find(|fd| !self.fds.contains_key(fd))
    }

    /// Descriptors a child starts with: everything not marked `CLOEXEC`.
    pub fn inherited_fds(&self) -> BTreeMap<RawFd, OpenFd> {
        self.fds
            .iter()
            .filter(|(_, open)| open.flags.is_inherited())
            .map(|(fd, open)| (*fd, open.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free_fd() {
        let mut process = SimProcess::new(1, None, b"/init".to_vec(), b"/".to_vec());
        for fd in 0..3 {
            process.fds.insert(fd, OpenFd::new(FdTarget::Terminal));
        }
        process.fds.insert(4, OpenFd::new(FdTarget::Terminal));
        assert_eq!(process.lowest_free_fd(0, 16), Some(3));
        assert_eq!(process.lowest_free_fd(4, 16), Some(5));
        assert_eq!(process.lowest_free_fd(0, 3), None);
    }

    #[test]
    fn test_inherited_skips_cloexec() {
        let mut process = SimProcess::new(1, None, b"/init".to_vec(), b"/".to_vec());
        process.fds.insert(0, OpenFd::new(FdTarget::Terminal));
        process.fds.insert(
            5,
            OpenFd::new(FdTarget::Terminal).with_flags(FdFlags::CLOEXEC),
        );
        let inherited = process.inherited_fds();
        assert!(inherited.contains_key(&0));
        assert!(!inherited.contains_key(&5));
    }

    #[test]
    fn test_open_modes() {
        assert!(OpenMode::Read.readable());
        assert!(!OpenMode::Read.writable());
        assert!(OpenMode::Append.writable());
        assert!(OpenMode::ReadWrite.readable() && OpenMode::ReadWrite.writable());
    }
}
