//! # Simulated Host
//!
//! This crate provides a simulated implementation of the host side of every
//! boundary call in [`host_api::HostApi`].
//!
//! ## Purpose
//!
//! The simulated host lets the client ABI be tested without a real runtime:
//! - Runs under `cargo test`
//! - Deterministic (no real processes, spawned programs are scripted)
//! - Inspectable (descriptor tables, files, terminal and mounts are readable)
//!
//! ## Model
//!
//! The host serves exactly one caller, pid 1, whose descriptors 0-2 are the
//! terminal. Spawned children run their [`Program`] to completion inside
//! the `spawn` call; background children stay `Running` until killed.
//!
//! A spawn is staged against a copy of the caller's inheritable descriptors.
//! Files, pipes and the pid are committed only once every redirect has been
//! applied, so a failing redirect leaves no trace.

pub mod audit;
pub mod config;
pub mod devices;
pub mod fault_injection;
pub mod process;
mod spawn;
pub mod vfs;

pub use audit::{HostAuditEvent, HostAuditLog, HostEvent};
pub use config::SimHostConfig;
pub use fault_injection::{FaultInjector, FaultPlan, HostFault};
pub use process::{FdTarget, OpenFd, OpenMode, ProcessState, Program, SimProcess};

use core_types::{DeviceId, Errno, EventMask, Pid, RawFd, Signal, Winsize};
use devices::{fifo_ioctl, terminal_ioctl, EventSource, FifoState, Pipe, TerminalState};
use host_api::ioctl::{FIFO_MAJOR, TERMINAL_MAJOR};
use host_api::{
    AbiLimits, FcntlCommand, HostApi, HostCapabilities, HostError, HostOp, IoctlCommand,
    MountRequest, SpawnOutcome, SpawnRequest,
};
use std::collections::BTreeMap;
use tracing::debug;
use vfs::{display, resolve, FileNode, HostPath, MountPoint, Node, Vfs};

/// Pid of the process every call is made on behalf of
pub const CALLER_PID: Pid = 1;

/// Simulated host state
///
/// Unlike a real host, all state is directly accessible for testing.
pub struct SimulatedHost {
    config: SimHostConfig,
    vfs: Vfs,
    processes: BTreeMap<Pid, SimProcess>,
    next_pid: Pid,
    terminal: TerminalState,
    fifos: BTreeMap<HostPath, FifoState>,
    pipes: BTreeMap<u64, Pipe>,
    next_pipe: u64,
    /// Pipe whose write end went to a child and whose read end is unclaimed
    unclaimed_pipe: Option<u64>,
    event_sources: BTreeMap<u64, EventSource>,
    next_event_source: u64,
    fault_injector: FaultInjector,
    audit_log: HostAuditLog,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::with_config(SimHostConfig::default())
    }

    pub fn with_config(config: SimHostConfig) -> Self {
        let mut caller = SimProcess::new(CALLER_PID, None, b"/init".to_vec(), b"/".to_vec());
        for fd in 0..3 {
            caller.fds.insert(fd, OpenFd::new(FdTarget::Terminal));
        }
        let mut processes = BTreeMap::new();
        processes.insert(CALLER_PID, caller);

        Self {
            terminal: TerminalState::new(config.terminal_size),
            config,
            vfs: Vfs::new(),
            processes,
            next_pid: CALLER_PID + 1,
            fifos: BTreeMap::new(),
            pipes: BTreeMap::new(),
            next_pipe: 0,
            unclaimed_pipe: None,
            event_sources: BTreeMap::new(),
            next_event_source: 0,
            fault_injector: FaultInjector::default(),
            audit_log: HostAuditLog::new(),
        }
    }

    /// Creates a host that injects the faults in `plan`.
    pub fn with_fault_plan(mut self, plan: FaultPlan) -> Self {
        self.fault_injector = FaultInjector::new(plan);
        self
    }

    pub fn config(&self) -> &SimHostConfig {
        &self.config
    }

    // Setup

    /// Creates a directory and any missing parents.
    pub fn create_dir(&mut self, path: &[u8]) {
        let path = resolve(b"/", path);
        self.vfs.create_dir_all(&path);
    }

    /// Creates or replaces a plain file, creating missing parents.
    pub fn write_file(&mut self, path: &[u8], data: &[u8]) {
        let path = resolve(b"/", path);
        if let Some(parent) = vfs::parent(&path) {
            self.vfs.create_dir_all(parent);
        }
        self.vfs.insert(
            path,
            Node::File(FileNode {
                data: data.to_vec(),
                ..FileNode::default()
            }),
        );
    }

    /// Makes an existing file refuse being opened for writing.
    pub fn protect_file(&mut self, path: &[u8]) -> bool {
        match self.vfs.get_mut(&resolve(b"/", path)) {
            Some(Node::File(file)) => {
                file.readonly = true;
                true
            }
            _ => false,
        }
    }

    /// Installs an executable at `path`.
    pub fn register_program(&mut self, path: &[u8], program: Program) {
        let path = resolve(b"/", path);
        if let Some(parent) = vfs::parent(&path) {
            self.vfs.create_dir_all(parent);
        }
        self.vfs.insert(
            path,
            Node::File(FileNode {
                program: Some(program),
                ..FileNode::default()
            }),
        );
    }

    /// Opens `path` in the caller's table at the lowest free descriptor, the
    /// way the caller's own runtime would before handing fds to host calls.
    pub fn open_for_caller(&mut self, path: &[u8], mode: OpenMode) -> Result<RawFd, HostError> {
        let path = resolve(&self.caller()?.cwd, path);
        let target = match self.vfs.get(&path) {
            Some(Node::Dir) => FdTarget::Directory { path },
            Some(Node::File(_)) => FdTarget::File { path, mode },
            Some(Node::Device(device)) => self.device_target(&path, *device)?,
            None => {
                return Err(HostError::from_code(
                    Errno::ENOENT,
                    format!("{} does not exist", display(&path)),
                ))
            }
        };
        self.install_caller_fd(OpenFd::new(target))
    }

    /// Resizes the terminal and posts `WINCH` to every event source.
    pub fn set_terminal_size(&mut self, size: Winsize) {
        self.terminal.size = size;
        self.post_event(EventMask::WINCH);
    }

    pub fn post_event(&mut self, events: EventMask) {
        for source in self.event_sources.values_mut() {
            source.post(events);
        }
    }

    /// Reads (and clears) the events pending on the caller's event-source fd.
    pub fn read_events(&mut self, fd: RawFd) -> Result<EventMask, HostError> {
        let id = match self.caller()?.fd(fd).map(|open| &open.target) {
            Some(FdTarget::EventSource(id)) => *id,
            Some(_) => return Err(HostError::from_code(Errno::EINVAL, "not an event source")),
            None => return Err(bad_fd(fd)),
        };
        self.event_sources
            .get_mut(&id)
            .map(EventSource::take)
            .ok_or_else(|| HostError::from_code(Errno::EBADF, "event source is gone"))
    }

    // Inspection

    pub fn caller_pid(&self) -> Pid {
        CALLER_PID
    }

    pub fn caller_process(&self) -> Option<&SimProcess> {
        self.processes.get(&CALLER_PID)
    }

    pub fn process(&self, pid: Pid) -> Option<&SimProcess> {
        self.processes.get(&pid)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn running_count(&self) -> usize {
        self.processes.values().filter(|p| p.is_running()).count()
    }

    pub fn node(&self, path: &[u8]) -> Option<&Node> {
        self.vfs.get(path)
    }

    pub fn file_contents(&self, path: &[u8]) -> Option<&[u8]> {
        match self.vfs.get(path) {
            Some(Node::File(file)) => Some(&file.data),
            _ => None,
        }
    }

    pub fn terminal(&self) -> &TerminalState {
        &self.terminal
    }

    pub fn pipe(&self, id: u64) -> Option<&Pipe> {
        self.pipes.get(&id)
    }

    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    pub fn fifo(&self, path: &[u8]) -> Option<&FifoState> {
        self.fifos.get(path)
    }

    pub fn mount_point(&self, target: &[u8]) -> Option<&MountPoint> {
        self.vfs.mount_point(target)
    }

    pub fn audit_log(&self) -> &HostAuditLog {
        &self.audit_log
    }

    pub fn audit_log_mut(&mut self) -> &mut HostAuditLog {
        &mut self.audit_log
    }

    // Internals

    /// Audits one call and applies any injected failure before running it.
    fn run<T>(
        &mut self,
        op: HostOp,
        call: impl FnOnce(&mut Self) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        self.audit_log.record_event(HostEvent::Invoked { op });
        let result = match self.fault_injector.take_failure(op) {
            Some(err) => Err(err),
            None => call(self),
        };
        match &result {
            Ok(_) => self.audit_log.record_event(HostEvent::Completed { op }),
            Err(err) => {
                debug!(%op, code = %err.code(), "host call rejected");
                self.audit_log.record_event(HostEvent::Rejected {
                    op,
                    code: err.code(),
                })
            }
        }
        result
    }

    fn caller(&self) -> Result<&SimProcess, HostError> {
        self.processes
            .get(&CALLER_PID)
            .ok_or_else(|| HostError::from_code(Errno::ESRCH, "caller process is gone"))
    }

    fn caller_mut(&mut self) -> Result<&mut SimProcess, HostError> {
        self.processes
            .get_mut(&CALLER_PID)
            .ok_or_else(|| HostError::from_code(Errno::ESRCH, "caller process is gone"))
    }

    fn caller_fd(&self, fd: RawFd) -> Result<&OpenFd, HostError> {
        self.config.limits.check_fd(fd)?;
        self.caller()?.fd(fd).ok_or_else(|| bad_fd(fd))
    }

    fn install_caller_fd(&mut self, open: OpenFd) -> Result<RawFd, HostError> {
        let max_fd = self.config.limits.max_fd;
        let caller = self.caller_mut()?;
        let fd = caller
            .lowest_free_fd(0, max_fd)
            .ok_or_else(|| HostError::from_code(Errno::EMFILE, "descriptor table is full"))?;
        caller.fds.insert(fd, open);
        Ok(fd)
    }

    /// What opening a device node yields, by major number.
    fn device_target(&self, path: &[u8], device: DeviceId) -> Result<FdTarget, HostError> {
        if device.major() == u32::from(TERMINAL_MAJOR) {
            Ok(FdTarget::Terminal)
        } else if device.major() == u32::from(FIFO_MAJOR) {
            Ok(FdTarget::Fifo {
                path: path.to_vec(),
            })
        } else {
            Err(HostError::from_code(
                Errno::ENODEV,
                format!("no driver for device {device} at {}", display(path)),
            ))
        }
    }

    fn require_event_source(&self) -> Result<(), HostError> {
        if !self.config.event_source {
            return Err(HostError::unsupported("event sources are disabled"));
        }
        Ok(())
    }

    fn do_chdir(&mut self, path: &[u8]) -> Result<(), HostError> {
        let path = resolve(&self.caller()?.cwd, path);
        match self.vfs.get(&path) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(HostError::from_code(
                    Errno::ENOTDIR,
                    format!("{} is not a directory", display(&path)),
                ))
            }
            None => {
                return Err(HostError::from_code(
                    Errno::ENOENT,
                    format!("{} does not exist", display(&path)),
                ))
            }
        }
        self.caller_mut()?.cwd = path;
        Ok(())
    }

    fn do_getcwd(&self, buf_len: usize) -> Result<Vec<u8>, HostError> {
        let cwd = &self.caller()?.cwd;
        if cwd.len() + 1 > buf_len {
            return Err(HostError::from_code(
                Errno::ENOBUFS,
                format!("cwd needs {} bytes, buffer has {}", cwd.len() + 1, buf_len),
            ));
        }
        Ok(cwd.clone())
    }

    fn do_set_env(&mut self, name: &[u8], value: Option<&[u8]>) -> Result<(), HostError> {
        if name.is_empty() || name.contains(&b'=') || name.contains(&0) {
            return Err(HostError::from_code(Errno::EINVAL, "bad variable name"));
        }
        let caller = self.caller_mut()?;
        match value {
            Some(value) => {
                caller.env.insert(name.to_vec(), value.to_vec());
            }
            None => {
                caller.env.remove(name);
            }
        }
        Ok(())
    }

    /// Drops pipes no live descriptor refers to and FIFO state whose node
    /// is gone.
    fn do_clean_inodes(&mut self) {
        let mut referenced: Vec<u64> = self.unclaimed_pipe.into_iter().collect();
        for process in self.processes.values().filter(|p| p.is_running()) {
            for open in process.fds.values() {
                if let FdTarget::PipeRead(id) | FdTarget::PipeWrite(id) = open.target {
                    referenced.push(id);
                }
            }
        }
        self.pipes.retain(|id, _| referenced.contains(id));

        let vfs = &self.vfs;
        self.fifos
            .retain(|path, _| matches!(vfs.get(path), Some(Node::Device(_))));
    }

    fn do_kill(&mut self, pid: Pid, signal: Signal) -> Result<(), HostError> {
        let process = self
            .processes
            .get_mut(&pid)
            .filter(|p| p.is_running())
            .ok_or_else(|| HostError::from_code(Errno::ESRCH, format!("no process {pid}")))?;

        if signal == Signal::Int {
            if let Some(id) = process.sigint_target {
                if let Some(source) = self.event_sources.get_mut(&id) {
                    source.post(EventMask::SIGINT);
                    return Ok(());
                }
            }
        }
        if signal.terminates_by_default() {
            process.state = ProcessState::Exited(128 + i32::from(signal.raw()));
        } else {
            process.signals.push(signal);
        }
        Ok(())
    }

    fn do_ioctl(&mut self, fd: RawFd, command: u32, payload: &[u8]) -> Result<Vec<u8>, HostError> {
        let target = self.caller_fd(fd)?.target.clone();
        let decoded = IoctlCommand::decode(command);
        let size = usize::from(decoded.size());
        if size != 0 && decoded.direction().writes() && payload.len() != size {
            return Err(HostError::from_code(
                Errno::EINVAL,
                format!("{decoded} expects {size} bytes, got {}", payload.len()),
            ));
        }
        match target {
            FdTarget::Terminal => terminal_ioctl(&mut self.terminal, command, payload),
            FdTarget::Fifo { path } => {
                fifo_ioctl(self.fifos.entry(path).or_default(), command, payload)
            }
            _ => Err(HostError::from_code(
                Errno::ENOTTY,
                format!("fd {fd} is not a device"),
            )),
        }
    }

    fn do_fcntl(&mut self, fd: RawFd, command: FcntlCommand) -> Result<i32, HostError> {
        self.caller_fd(fd)?;
        let max_fd = self.config.limits.max_fd;
        let caller = self.caller_mut()?;
        match command {
            FcntlCommand::MoveFd { min_fd } => {
                if !(0..max_fd).contains(&min_fd) {
                    return Err(HostError::from_code(
                        Errno::EINVAL,
                        format!("minimum fd {min_fd} out of range"),
                    ));
                }
                let new_fd = caller.lowest_free_fd(min_fd, max_fd).ok_or_else(|| {
                    HostError::from_code(Errno::EMFILE, "no free descriptor above minimum")
                })?;
                if let Some(open) = caller.fds.remove(&fd) {
                    caller.fds.insert(new_fd, open);
                }
                Ok(new_fd)
            }
            FcntlCommand::GetFdFlags => Ok(caller
                .fds
                .get(&fd)
                .map_or(0, |open| i32::from(open.flags.bits()))),
            FcntlCommand::SetFdFlags { flags } => {
                if let Some(open) = caller.fds.get_mut(&fd) {
                    open.flags = flags;
                }
                Ok(0)
            }
        }
    }

    fn do_mount(&mut self, request: &MountRequest<'_>) -> Result<(), HostError> {
        if !self.config.supports_filesystem(request.fs_type()) {
            return Err(HostError::from_code(
                Errno::ENODEV,
                format!("unknown filesystem {}", display(request.fs_type())),
            ));
        }
        let cwd = self.caller()?.cwd.clone();
        let base = match request.source_fd() {
            Some(fd) => match &self.caller_fd(fd)?.target {
                FdTarget::Directory { path } => path.clone(),
                _ => {
                    return Err(HostError::from_code(
                        Errno::ENOTDIR,
                        format!("source fd {fd} is not a directory"),
                    ))
                }
            },
            None => cwd.clone(),
        };
        let source = if request.source_path().is_empty() {
            Vec::new()
        } else {
            resolve(&base, request.source_path())
        };
        let target = resolve(&cwd, request.target_path());
        let mount = MountPoint::new(
            source,
            display(request.fs_type()),
            request.flags(),
            request.data().to_vec(),
        );
        self.vfs.mount(target, mount)
    }

    fn do_umount(&mut self, path: &[u8]) -> Result<(), HostError> {
        let target = resolve(&self.caller()?.cwd, path);
        if self.vfs.mount_point(&target).is_some() {
            let busy = self
                .processes
                .values()
                .any(|p| p.is_running() && vfs::is_within(&p.cwd, &target));
            if busy {
                return Err(HostError::from_code(
                    Errno::EBUSY,
                    format!("{} is some process's working directory", display(&target)),
                ));
            }
        }
        self.vfs.umount(&target).map(|_| ())
    }

    fn do_mknod(&mut self, path: &[u8], device: DeviceId) -> Result<(), HostError> {
        let path = resolve(&self.caller()?.cwd, path);
        if self.vfs.contains(&path) {
            return Err(HostError::from_code(
                Errno::EEXIST,
                format!("{} already exists", display(&path)),
            ));
        }
        self.vfs.check_parent(&path)?;
        self.vfs.check_writable(&path)?;
        if device.major() == u32::from(FIFO_MAJOR) {
            self.fifos.insert(path.clone(), FifoState::default());
        }
        self.vfs.insert(path, Node::Device(device));
        Ok(())
    }

    fn do_event_source_fd(&mut self, mask: EventMask) -> Result<RawFd, HostError> {
        self.require_event_source()?;
        if mask.is_empty() {
            return Err(HostError::from_code(Errno::EINVAL, "empty event mask"));
        }
        let id = self.next_event_source;
        let fd = self.install_caller_fd(OpenFd::new(FdTarget::EventSource(id)))?;
        self.next_event_source += 1;
        self.event_sources.insert(id, EventSource::new(mask));
        Ok(fd)
    }

    fn do_attach_sigint(&mut self, fd: RawFd) -> Result<(), HostError> {
        self.require_event_source()?;
        let id = match self.caller_fd(fd)?.target {
            FdTarget::EventSource(id) => id,
            _ => {
                return Err(HostError::from_code(
                    Errno::EINVAL,
                    format!("fd {fd} is not an event source"),
                ))
            }
        };
        self.caller_mut()?.sigint_target = Some(id);
        Ok(())
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn bad_fd(fd: RawFd) -> HostError {
    HostError::from_code(Errno::EBADF, format!("fd {fd} is not open"))
}

impl HostApi for SimulatedHost {
    fn limits(&self) -> AbiLimits {
        self.config.limits
    }

    fn capabilities(&mut self) -> Result<HostCapabilities, HostError> {
        self.run(HostOp::Capabilities, |host| {
            Ok(HostCapabilities {
                event_source: host.config.event_source,
            })
        })
    }

    fn chdir(&mut self, path: &[u8]) -> Result<(), HostError> {
        self.run(HostOp::Chdir, |host| host.do_chdir(path))
    }

    fn getcwd(&mut self, buf_len: usize) -> Result<Vec<u8>, HostError> {
        self.run(HostOp::Getcwd, |host| host.do_getcwd(buf_len))
    }

    fn isatty(&mut self, fd: RawFd) -> Result<bool, HostError> {
        self.run(HostOp::Isatty, |host| {
            Ok(host.caller_fd(fd)?.target == FdTarget::Terminal)
        })
    }

    fn set_env(&mut self, name: &[u8], value: Option<&[u8]>) -> Result<(), HostError> {
        self.run(HostOp::SetEnv, |host| host.do_set_env(name, value))
    }

    fn getpid(&mut self) -> Result<Pid, HostError> {
        self.run(HostOp::Getpid, |host| Ok(host.caller()?.pid))
    }

    fn clean_inodes(&mut self) -> Result<(), HostError> {
        self.run(HostOp::CleanInodes, |host| {
            host.do_clean_inodes();
            Ok(())
        })
    }

    fn spawn(&mut self, request: &SpawnRequest<'_>) -> Result<SpawnOutcome, HostError> {
        self.run(HostOp::Spawn, |host| {
            let result = host.do_spawn(request);
            host.fault_injector.finish_spawn();
            result
        })
    }

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), HostError> {
        self.run(HostOp::Kill, |host| host.do_kill(pid, signal))
    }

    fn ioctl(&mut self, fd: RawFd, command: u32, payload: &[u8]) -> Result<Vec<u8>, HostError> {
        self.run(HostOp::Ioctl, |host| host.do_ioctl(fd, command, payload))
    }

    fn fcntl(&mut self, fd: RawFd, command: FcntlCommand) -> Result<i32, HostError> {
        self.run(HostOp::Fcntl, |host| host.do_fcntl(fd, command))
    }

    fn mount(&mut self, request: &MountRequest<'_>) -> Result<(), HostError> {
        self.run(HostOp::Mount, |host| host.do_mount(request))
    }

    fn umount(&mut self, path: &[u8]) -> Result<(), HostError> {
        self.run(HostOp::Umount, |host| host.do_umount(path))
    }

    fn mknod(&mut self, path: &[u8], device: DeviceId) -> Result<(), HostError> {
        self.run(HostOp::Mknod, |host| host.do_mknod(path, device))
    }

    fn event_source_fd(&mut self, mask: EventMask) -> Result<RawFd, HostError> {
        self.run(HostOp::EventSourceFd, |host| host.do_event_source_fd(mask))
    }

    fn attach_sigint(&mut self, fd: RawFd) -> Result<(), HostError> {
        self.run(HostOp::AttachSigint, |host| host.do_attach_sigint(fd))
    }
}
