//! Spawn staging and commit
//!
//! Redirects are applied in order against a staged copy of the child's
//! descriptor table. Nothing in the host changes until all of them have
//! succeeded.
//!
//! Pipes chain like a shell pipeline: a `PipeOut` redirect leaves its pipe
//! unclaimed, and the next `PipeIn` (in this spawn or a later one) reads
//! from it. A `PipeIn` with nothing unclaimed gets an empty pipe.

use crate::process::{FdTarget, OpenFd, OpenMode, ProcessState, Program, SimProcess};
use crate::vfs::{display, resolve, FileNode, HostPath, Node};
use crate::{bad_fd, SimulatedHost, CALLER_PID};
use core_types::{Errno, FdFlags, RawFd, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use host_api::{HostError, Redirect, RedirectKind, SpawnOutcome, SpawnRequest, WorkDir};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Changes a spawn would make, held back until commit
struct Staging {
    fds: BTreeMap<RawFd, OpenFd>,
    /// Slots emptied by a `Close` redirect in this spawn
    closed: BTreeSet<RawFd>,
    /// Files to create, or to truncate when `true`
    files: BTreeMap<HostPath, bool>,
    new_pipes: Vec<u64>,
    unclaimed_pipe: Option<u64>,
}

fn too_big(what: &str, count: usize, max: usize) -> Result<(), HostError> {
    if count > max {
        return Err(HostError::from_code(
            Errno::E2BIG,
            format!("{count} {what} exceeds host limit {max}"),
        ));
    }
    Ok(())
}

impl SimulatedHost {
    pub(crate) fn do_spawn(&mut self, request: &SpawnRequest<'_>) -> Result<SpawnOutcome, HostError> {
        let limits = self.config.limits;
        too_big("args", request.args().len(), limits.max_args)?;
        too_big("env entries", request.env().len(), limits.max_env)?;
        too_big("redirects", request.redirects().len(), limits.max_redirects)?;

        let caller = self.caller()?;
        let cwd = match request.workdir() {
            WorkDir::Inherit => caller.cwd.clone(),
            WorkDir::Fd(fd) => match caller.fd(fd).map(|open| &open.target) {
                Some(FdTarget::Directory { path }) => path.clone(),
                Some(_) => {
                    return Err(HostError::from_code(
                        Errno::ENOTDIR,
                        format!("workdir fd {fd} is not a directory"),
                    ))
                }
                None => return Err(bad_fd(fd)),
            },
        };
        let path = resolve(&caller.cwd, request.path());
        let program = match self.vfs.get(&path) {
            Some(Node::File(FileNode {
                program: Some(program),
                ..
            })) => program.clone(),
            Some(_) => {
                return Err(HostError::from_code(
                    Errno::EACCES,
                    format!("{} is not executable", display(&path)),
                ))
            }
            None => {
                return Err(HostError::from_code(
                    Errno::ENOENT,
                    format!("{} does not exist", display(&path)),
                ))
            }
        };

        if self.fault_injector.process_slots_exhausted()
            || self.running_count() >= self.config.max_processes
        {
            return Err(HostError::from_code(Errno::EAGAIN, "no free process slots"));
        }

        let mut staging = Staging {
            fds: caller.inherited_fds(),
            closed: BTreeSet::new(),
            files: BTreeMap::new(),
            new_pipes: Vec::new(),
            unclaimed_pipe: self.unclaimed_pipe,
        };
        for (index, redirect) in request.redirects().iter().enumerate() {
            self.stage_redirect(&mut staging, index, redirect, &cwd)?;
        }

        // Commit
        for (file, truncate) in staging.files {
            match self.vfs.get_mut(&file) {
                Some(Node::File(existing)) if truncate => existing.data.clear(),
                Some(_) => {}
                None => self.vfs.insert(file, Node::File(FileNode::default())),
            }
        }
        for id in &staging.new_pipes {
            self.pipes.insert(*id, Default::default());
        }
        self.next_pipe += staging.new_pipes.len() as u64;
        self.unclaimed_pipe = staging.unclaimed_pipe;

        let pid = self.next_pid;
        self.next_pid += 1;

        let mut child = SimProcess::new(pid, Some(CALLER_PID), path, cwd);
        child.args = request.args().iter().map(|arg| arg.to_vec()).collect();
        child.env = self.caller()?.env.clone();
        for var in request.env() {
            child.env.insert(var.name().to_vec(), var.value().to_vec());
        }
        child.fds = staging.fds;

        self.run_program(&child, &program);
        let status = if request.is_background() {
            0
        } else {
            child.state = ProcessState::Exited(program.status);
            program.status
        };
        debug!(
            pid,
            path = %String::from_utf8_lossy(&child.path),
            status,
            background = request.is_background(),
            "spawned"
        );
        self.processes.insert(pid, child);
        Ok(SpawnOutcome { pid, status })
    }

    fn stage_redirect(
        &self,
        staging: &mut Staging,
        index: usize,
        redirect: &Redirect<'_>,
        cwd: &[u8],
    ) -> Result<(), HostError> {
        if let Some(err) = self.fault_injector.redirect_failure(index) {
            return Err(err);
        }
        let dst_fd = redirect.dst_fd();
        self.config.limits.check_fd(dst_fd)?;
        trace!(index, dst_fd, kind = ?redirect.kind(), "apply redirect");

        let open = match redirect.kind() {
            RedirectKind::Read(path) => OpenFd::new(self.stage_read(&resolve(cwd, path), staging)?),
            RedirectKind::Write(path) => {
                OpenFd::new(self.stage_write(resolve(cwd, path), OpenMode::Write, staging)?)
            }
            RedirectKind::Append(path) => {
                OpenFd::new(self.stage_write(resolve(cwd, path), OpenMode::Append, staging)?)
                    .with_flags(FdFlags::APPEND)
            }
            RedirectKind::ReadWrite(path) => {
                OpenFd::new(self.stage_write(resolve(cwd, path), OpenMode::ReadWrite, staging)?)
            }
            RedirectKind::PipeIn => {
                let id = match staging.unclaimed_pipe.take() {
                    Some(id) => id,
                    None => self.stage_pipe(staging),
                };
                OpenFd::new(FdTarget::PipeRead(id))
            }
            RedirectKind::PipeOut => {
                let id = self.stage_pipe(staging);
                staging.unclaimed_pipe = Some(id);
                OpenFd::new(FdTarget::PipeWrite(id))
            }
            RedirectKind::Duplicate { src_fd } => {
                let src = match staging.fds.get(&src_fd) {
                    Some(src) => src,
                    // CLOEXEC only strips the child's table; the caller still owns it.
                    None if !staging.closed.contains(&src_fd) => {
                        self.caller()?.fd(src_fd).ok_or_else(|| bad_fd(src_fd))?
                    }
                    None => return Err(bad_fd(src_fd)),
                };
                OpenFd::new(src.target.clone()).with_flags(src.flags.difference(FdFlags::CLOEXEC))
            }
            RedirectKind::Close => {
                staging.fds.remove(&dst_fd);
                staging.closed.insert(dst_fd);
                return Ok(());
            }
        };
        staging.closed.remove(&dst_fd);
        staging.fds.insert(dst_fd, open);
        Ok(())
    }

    fn stage_pipe(&self, staging: &mut Staging) -> u64 {
        let id = self.next_pipe + staging.new_pipes.len() as u64;
        staging.new_pipes.push(id);
        id
    }

    fn stage_read(&self, path: &[u8], staging: &Staging) -> Result<FdTarget, HostError> {
        let mode = OpenMode::Read;
        if staging.files.contains_key(path) {
            return Ok(FdTarget::File {
                path: path.to_vec(),
                mode,
            });
        }
        match self.vfs.get(path) {
            Some(Node::File(_)) => Ok(FdTarget::File {
                path: path.to_vec(),
                mode,
            }),
            Some(Node::Dir) => Err(HostError::from_code(
                Errno::EISDIR,
                format!("{} is a directory", display(path)),
            )),
            Some(Node::Device(device)) => self.device_target(path, *device),
            None => Err(HostError::from_code(
                Errno::ENOENT,
                format!("{} does not exist", display(path)),
            )),
        }
    }

    fn stage_write(
        &self,
        path: HostPath,
        mode: OpenMode,
        staging: &mut Staging,
    ) -> Result<FdTarget, HostError> {
        match self.vfs.get(&path) {
            Some(Node::Dir) => {
                return Err(HostError::from_code(
                    Errno::EISDIR,
                    format!("{} is a directory", display(&path)),
                ))
            }
            Some(Node::Device(device)) => return self.device_target(&path, *device),
            Some(Node::File(file)) => {
                if file.readonly {
                    return Err(HostError::from_code(
                        Errno::EACCES,
                        format!("{} is read-only", display(&path)),
                    ));
                }
                self.vfs.check_writable(&path)?;
            }
            None if staging.files.contains_key(&path) => {}
            None => {
                self.vfs.check_parent(&path)?;
                self.vfs.check_writable(&path)?;
            }
        }

        let truncate = mode == OpenMode::Write;
        let entry = staging.files.entry(path.clone()).or_insert(false);
        *entry |= truncate;
        Ok(FdTarget::File { path, mode })
    }

    /// Runs a freshly spawned program against its descriptor table.
    fn run_program(&mut self, child: &SimProcess, program: &Program) {
        let mut stdout = Vec::new();
        if program.copy_stdin {
            if let Some(open) = child.fd(STDIN_FILENO) {
                stdout.extend(self.read_all(&open.target));
            }
        }
        stdout.extend_from_slice(&program.stdout);

        for (fd, bytes) in [(STDOUT_FILENO, &stdout), (STDERR_FILENO, &program.stderr)] {
            if bytes.is_empty() {
                continue;
            }
            if let Some(open) = child.fd(fd) {
                self.write_all(&open.target, bytes);
            }
        }
    }

    fn read_all(&mut self, target: &FdTarget) -> Vec<u8> {
        match target {
            FdTarget::File { path, mode } if mode.readable() => match self.vfs.get(path) {
                Some(Node::File(file)) => file.data.clone(),
                _ => Vec::new(),
            },
            FdTarget::PipeRead(id) => self
                .pipes
                .get_mut(id)
                .map(|pipe| std::mem::take(&mut pipe.buffer))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn write_all(&mut self, target: &FdTarget, bytes: &[u8]) {
        match target {
            FdTarget::File { path, mode } if mode.writable() => {
                if let Some(Node::File(file)) = self.vfs.get_mut(path) {
                    file.data.extend_from_slice(bytes);
                }
            }
            FdTarget::Terminal => self.terminal.output.extend_from_slice(bytes),
            FdTarget::PipeWrite(id) => {
                if let Some(pipe) = self.pipes.get_mut(id) {
                    pipe.buffer.extend_from_slice(bytes);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fault_injection::{FaultPlan, HostFault};
    use crate::process::{FdTarget, OpenMode, ProcessState, Program};
    use crate::{SimHostConfig, SimulatedHost};
    use core_types::{Errno, FdFlags};
    use host_api::{AbiLimits, FcntlCommand, HostApi, HostError, Redirect, SpawnRequest, WorkDir};

    fn host_with_echo() -> SimulatedHost {
        let mut host = SimulatedHost::new();
        host.register_program(b"/bin/echo", Program::new().with_stdout(b"hello\n"));
        host
    }

    #[test]
    fn test_foreground_spawn_writes_to_terminal() {
        let mut host = host_with_echo();
        let request = SpawnRequest::builder(b"/bin/echo").arg(b"echo").build().unwrap();
        let outcome = host.spawn(&request).unwrap();
        assert_eq!(outcome.pid, 2);
        assert_eq!(outcome.status, 0);
        assert_eq!(host.terminal().output, b"hello\n");
        assert_eq!(host.process(2).unwrap().state, ProcessState::Exited(0));
        assert_eq!(host.process(2).unwrap().args, vec![b"echo".to_vec()]);
    }

    #[test]
    fn test_later_redirect_overrides_earlier() {
        let mut host = host_with_echo();
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::write(1, b"/tmp/a", &limits).unwrap())
            .redirect(Redirect::duplicate(2, 1, &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&request).unwrap();

        let child = host.process(2).unwrap();
        assert_eq!(child.fd(1).unwrap().target, FdTarget::Terminal);
        assert_eq!(host.file_contents(b"/tmp/a"), Some(b"".as_slice()));
        assert_eq!(host.terminal().output, b"hello\n");
    }

    #[test]
    fn test_failed_redirect_commits_nothing() {
        let mut host = host_with_echo();
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::write(1, b"/tmp/out", &limits).unwrap())
            .redirect(Redirect::pipe_out(3, &limits).unwrap())
            .redirect(Redirect::read(0, b"/missing/input", &limits).unwrap())
            .build()
            .unwrap();
        let err = host.spawn(&request).unwrap_err();
        assert_eq!(err.code(), Errno::ENOENT);
        assert!(matches!(err, HostError::NotFound { .. }));

        assert!(host.node(b"/tmp/out").is_none());
        assert_eq!(host.pipe_count(), 0);
        assert_eq!(host.process_count(), 1);

        // The pid was not consumed either.
        let request = SpawnRequest::builder(b"/bin/echo").build().unwrap();
        assert_eq!(host.spawn(&request).unwrap().pid, 2);
    }

    #[test]
    fn test_injected_redirect_failure() {
        let plan = FaultPlan::new().with_fault(HostFault::FailRedirect {
            index: 1,
            code: Errno::EMFILE,
        });
        let mut host = host_with_echo().with_fault_plan(plan);
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::write(1, b"/tmp/out", &limits).unwrap())
            .redirect(Redirect::close(0, &limits).unwrap())
            .build()
            .unwrap();
        assert_eq!(host.spawn(&request).unwrap_err().code(), Errno::EMFILE);
        assert!(host.node(b"/tmp/out").is_none());

        // Spent after one spawn.
        host.spawn(&request).unwrap();
        assert_eq!(host.file_contents(b"/tmp/out"), Some(b"hello\n".as_slice()));
    }

    #[test]
    fn test_cloexec_not_inherited() {
        let mut host = host_with_echo();
        host.fcntl(2, FcntlCommand::SetFdFlags { flags: FdFlags::CLOEXEC })
            .unwrap();
        let request = SpawnRequest::builder(b"/bin/echo").build().unwrap();
        host.spawn(&request).unwrap();

        let child = host.process(2).unwrap();
        assert!(child.fd(0).is_some());
        assert!(child.fd(2).is_none());
    }

    #[test]
    fn test_duplicate_reads_child_table() {
        let mut host = host_with_echo();
        host.fcntl(2, FcntlCommand::SetFdFlags { flags: FdFlags::CLOEXEC })
            .unwrap();
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::duplicate(1, 5, &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&request).unwrap();
        assert!(host.process(2).unwrap().fd(5).unwrap().flags.is_empty());

        // A slot closed earlier in the same spawn is gone.
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::close(1, &limits).unwrap())
            .redirect(Redirect::duplicate(1, 5, &limits).unwrap())
            .build()
            .unwrap();
        assert_eq!(host.spawn(&request).unwrap_err().code(), Errno::EBADF);
        assert_eq!(host.process_count(), 2);
    }

    #[test]
    fn test_duplicate_from_cloexec_caller_fd() {
        let mut host = host_with_echo();
        host.write_file(b"/tmp/log", b"");
        let fd = host.open_for_caller(b"/tmp/log", OpenMode::Write).unwrap();
        host.fcntl(fd, FcntlCommand::SetFdFlags { flags: FdFlags::CLOEXEC })
            .unwrap();
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::duplicate(fd, 1, &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&request).unwrap();

        let child = host.process(2).unwrap();
        assert!(child.fd(fd).is_none());
        assert!(!child.fd(1).unwrap().flags.contains(FdFlags::CLOEXEC));
        assert_eq!(host.file_contents(b"/tmp/log"), Some(b"hello\n".as_slice()));
    }

    #[test]
    fn test_read_write_keeps_contents() {
        let mut host = host_with_echo();
        host.write_file(b"/tmp/log", b"old\n");
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::read_write(1, b"/tmp/log", &limits).unwrap())
            .redirect(Redirect::read_write(2, b"/tmp/new", &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&request).unwrap();

        assert_eq!(host.file_contents(b"/tmp/log"), Some(b"old\nhello\n".as_slice()));
        assert_eq!(host.file_contents(b"/tmp/new"), Some(b"".as_slice()));
    }

    #[test]
    fn test_append_and_truncate() {
        let mut host = host_with_echo();
        host.write_file(b"/tmp/log", b"old\n");
        let limits = AbiLimits::default();

        let append = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::append(1, b"/tmp/log", &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&append).unwrap();
        assert_eq!(host.file_contents(b"/tmp/log"), Some(b"old\nhello\n".as_slice()));
        assert!(host
            .process(2)
            .unwrap()
            .fd(1)
            .unwrap()
            .flags
            .contains(FdFlags::APPEND));

        let write = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::write(1, b"/tmp/log", &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&write).unwrap();
        assert_eq!(host.file_contents(b"/tmp/log"), Some(b"hello\n".as_slice()));
    }

    #[test]
    fn test_pipeline_between_spawns() {
        let mut host = host_with_echo();
        host.register_program(b"/bin/cat", Program::new().copying_stdin());
        let limits = AbiLimits::default();

        let producer = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::pipe_out(1, &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&producer).unwrap();

        let consumer = SpawnRequest::builder(b"/bin/cat")
            .redirect(Redirect::pipe_in(0, &limits).unwrap())
            .redirect(Redirect::write(1, b"/tmp/piped", &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&consumer).unwrap();
        assert_eq!(host.file_contents(b"/tmp/piped"), Some(b"hello\n".as_slice()));
        assert!(host.terminal().output.is_empty());
    }

    #[test]
    fn test_read_redirect_rules() {
        let mut host = SimulatedHost::new();
        host.register_program(b"/bin/cat", Program::new().copying_stdin());
        host.write_file(b"/tmp/in", b"data");
        let limits = AbiLimits::default();

        let request = SpawnRequest::builder(b"/bin/cat")
            .redirect(Redirect::read(0, b"/tmp/in", &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&request).unwrap();
        assert_eq!(host.terminal().output, b"data");

        let request = SpawnRequest::builder(b"/bin/cat")
            .redirect(Redirect::read(0, b"/tmp", &limits).unwrap())
            .build()
            .unwrap();
        assert_eq!(host.spawn(&request).unwrap_err().code(), Errno::EISDIR);
    }

    #[test]
    fn test_write_permission_rules() {
        let mut host = host_with_echo();
        host.write_file(b"/tmp/locked", b"keep");
        host.protect_file(b"/tmp/locked");
        let limits = AbiLimits::default();

        let request = SpawnRequest::builder(b"/bin/echo")
            .redirect(Redirect::write(1, b"/tmp/locked", &limits).unwrap())
            .build()
            .unwrap();
        let err = host.spawn(&request).unwrap_err();
        assert!(matches!(err, HostError::PermissionDenied { .. }));
        assert_eq!(host.file_contents(b"/tmp/locked"), Some(b"keep".as_slice()));
    }

    #[test]
    fn test_program_lookup() {
        let mut host = SimulatedHost::new();
        host.write_file(b"/tmp/data", b"");
        let missing = SpawnRequest::builder(b"/bin/nope").build().unwrap();
        assert_eq!(host.spawn(&missing).unwrap_err().code(), Errno::ENOENT);
        let plain = SpawnRequest::builder(b"/tmp/data").build().unwrap();
        assert_eq!(host.spawn(&plain).unwrap_err().code(), Errno::EACCES);
    }

    #[test]
    fn test_workdir_fd() {
        let mut host = host_with_echo();
        host.create_dir(b"/work");
        let dir_fd = host
            .open_for_caller(b"/work", crate::OpenMode::Read)
            .unwrap();
        let limits = AbiLimits::default();
        let request = SpawnRequest::builder(b"/bin/echo")
            .workdir(WorkDir::Fd(dir_fd))
            .redirect(Redirect::write(1, b"out", &limits).unwrap())
            .build()
            .unwrap();
        host.spawn(&request).unwrap();
        assert_eq!(host.process(2).unwrap().cwd, b"/work");
        assert_eq!(host.file_contents(b"/work/out"), Some(b"hello\n".as_slice()));

        let request = SpawnRequest::builder(b"/bin/echo")
            .workdir(WorkDir::Fd(0))
            .build()
            .unwrap();
        assert_eq!(host.spawn(&request).unwrap_err().code(), Errno::ENOTDIR);
    }

    #[test]
    fn test_background_and_slots() {
        let config = SimHostConfig::default().with_max_processes(2);
        let mut host = SimulatedHost::with_config(config);
        host.register_program(b"/bin/sleep", Program::new().with_status(3));

        let request = SpawnRequest::builder(b"/bin/sleep")
            .background(true)
            .build()
            .unwrap();
        let outcome = host.spawn(&request).unwrap();
        assert_eq!(outcome.status, 0);
        assert_eq!(host.process(outcome.pid).unwrap().state, ProcessState::Running);

        let err = host.spawn(&request).unwrap_err();
        assert_eq!(err.code(), Errno::EAGAIN);
        assert!(matches!(err, HostError::ResourceExhausted { .. }));

        host.kill(outcome.pid, core_types::Signal::Term).unwrap();
        assert_eq!(
            host.process(outcome.pid).unwrap().state,
            ProcessState::Exited(128 + 15)
        );
        assert_eq!(host.spawn(&request).unwrap().pid, 3);
    }

    #[test]
    fn test_env_is_inherited_and_extended() {
        let mut host = host_with_echo();
        host.set_env(b"PATH", Some(b"/bin".as_slice())).unwrap();
        let request = SpawnRequest::builder(b"/bin/echo")
            .env(b"LANG", b"C")
            .build()
            .unwrap();
        host.spawn(&request).unwrap();
        let env = &host.process(2).unwrap().env;
        assert_eq!(env.get(b"PATH".as_slice()), Some(&b"/bin".to_vec()));
        assert_eq!(env.get(b"LANG".as_slice()), Some(&b"C".to_vec()));
    }
}
