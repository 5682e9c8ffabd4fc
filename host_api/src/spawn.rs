//! Process spawning
//!
//! A [`SpawnRequest`] borrows every byte string it refers to and owns no
//! host resources. It is validated once when built; the host then applies
//! its redirects in order inside one transaction, so a failure leaves no
//! process behind and yields no pid.

use crate::error::{check_no_nul, check_path};
use crate::redirect::{Redirect, RedirectSpec};
use crate::{AbiLimits, HostApi, HostError};
use core_types::{Errno, ExitCode, Pid, RawFd};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment entry of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvVar<'a> {
    name: &'a [u8],
    value: &'a [u8],
}

impl<'a> EnvVar<'a> {
    /// Validates an entry: a non-empty name without `=` and no NUL in either half.
    pub fn new(name: &'a [u8], value: &'a [u8]) -> Result<Self, HostError> {
        check_path("environment name", name)?;
        if name.contains(&b'=') {
            return Err(HostError::InvalidArgument(
                "environment name contains '='".to_string(),
            ));
        }
        check_no_nul("environment value", value)?;
        Ok(Self { name, value })
    }

    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    pub fn value(&self) -> &'a [u8] {
        self.value
    }
}

/// Working directory of the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkDir {
    /// Same directory as the caller
    #[default]
    Inherit,
    /// Directory open at this descriptor
    Fd(RawFd),
}

/// Result of a successful spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOutcome {
    pub pid: Pid,
    /// Exit status for foreground spawns, 0 for background ones
    pub status: ExitCode,
}

/// A validated spawn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest<'a> {
    path: &'a [u8],
    args: Vec<&'a [u8]>,
    env: Vec<EnvVar<'a>>,
    redirects: Vec<Redirect<'a>>,
    workdir: WorkDir,
    background: bool,
}

impl<'a> SpawnRequest<'a> {
    /// Validates and assembles a foreground spawn request.
    pub fn build(
        path: &'a [u8],
        args: &[&'a [u8]],
        env: &[EnvVar<'a>],
        redirects: &[Redirect<'a>],
        workdir: WorkDir,
        limits: &AbiLimits,
    ) -> Result<Self, HostError> {
        check_path("program path", path)?;
        check_count("arguments", args.len(), limits.max_args)?;
        check_count("environment entries", env.len(), limits.max_env)?;
        check_count("redirects", redirects.len(), limits.max_redirects)?;
        for arg in args {
            check_no_nul("argument", arg)?;
        }
        if let WorkDir::Fd(fd) = workdir {
            limits.check_fd(fd)?;
        }

        Ok(Self {
            path,
            args: args.to_vec(),
            env: env.to_vec(),
            redirects: redirects.to_vec(),
            workdir,
            background: false,
        })
    }

    /// Starts a chaining builder.
    pub fn builder(path: &'a [u8]) -> SpawnRequestBuilder<'a> {
        SpawnRequestBuilder::new(path)
    }

    pub fn path(&self) -> &'a [u8] {
        self.path
    }

    pub fn args(&self) -> &[&'a [u8]] {
        &self.args
    }

    pub fn env(&self) -> &[EnvVar<'a>] {
        &self.env
    }

    pub fn redirects(&self) -> &[Redirect<'a>] {
        &self.redirects
    }

    pub fn workdir(&self) -> WorkDir {
        self.workdir
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Issues the spawn and blocks until the host answers.
    pub fn spawn<H: HostApi + ?Sized>(self, host: &mut H) -> Result<SpawnOutcome, HostError> {
        debug!(
            path = %String::from_utf8_lossy(self.path),
            args = self.args.len(),
            redirects = self.redirects.len(),
            background = self.background,
            "spawn"
        );
        host.spawn(&self)
    }

    /// Owned wire form.
    pub fn to_spec(&self) -> SpawnSpec {
        SpawnSpec {
            path: self.path.to_vec(),
            args: self.args.iter().map(|arg| arg.to_vec()).collect(),
            env: self
                .env
                .iter()
                .map(|var| (var.name.to_vec(), var.value.to_vec()))
                .collect(),
            redirects: self.redirects.iter().map(Redirect::to_spec).collect(),
            workdir: self.workdir,
            background: self.background,
        }
    }
}

fn check_count(what: &str, count: usize, max: usize) -> Result<(), HostError> {
    if count > max {
        return Err(HostError::ResourceExhausted {
            code: Errno::E2BIG,
            message: format!("{} {} exceeds limit {}", count, what, max),
        });
    }
    Ok(())
}

/// Chaining builder for [`SpawnRequest`]
///
/// Collects raw parts and validates everything in [`Self::build`].
#[derive(Debug, Clone)]
pub struct SpawnRequestBuilder<'a> {
    path: &'a [u8],
    args: Vec<&'a [u8]>,
    env: Vec<(&'a [u8], &'a [u8])>,
    redirects: Vec<Redirect<'a>>,
    workdir: WorkDir,
    background: bool,
    limits: AbiLimits,
}

impl<'a> SpawnRequestBuilder<'a> {
    pub fn new(path: &'a [u8]) -> Self {
        Self {
            path,
            args: Vec::new(),
            env: Vec::new(),
            redirects: Vec::new(),
            workdir: WorkDir::Inherit,
            background: false,
            limits: AbiLimits::default(),
        }
    }

    pub fn limits(mut self, limits: AbiLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn arg(mut self, arg: &'a [u8]) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        self.args.extend(args);
        self
    }

    pub fn env(mut self, name: &'a [u8], value: &'a [u8]) -> Self {
        self.env.push((name, value));
        self
    }

    pub fn redirect(mut self, redirect: Redirect<'a>) -> Self {
        self.redirects.push(redirect);
        self
    }

    pub fn workdir(mut self, workdir: WorkDir) -> Self {
        self.workdir = workdir;
        self
    }

    /// Background spawns return as soon as the child exists.
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn build(self) -> Result<SpawnRequest<'a>, HostError> {
        let env = self
            .env
            .iter()
            .map(|&(name, value)| EnvVar::new(name, value))
            .collect::<Result<Vec<_>, _>>()?;
        let mut request = SpawnRequest::build(
            self.path,
            &self.args,
            &env,
            &self.redirects,
            self.workdir,
            &self.limits,
        )?;
        request.background = self.background;
        Ok(request)
    }
}

/// Wire form of [`SpawnRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnSpec {
    pub path: Vec<u8>,
    pub args: Vec<Vec<u8>>,
    pub env: Vec<(Vec<u8>, Vec<u8>)>,
    pub redirects: Vec<RedirectSpec>,
    pub workdir: WorkDir,
    pub background: bool,
}

impl SpawnSpec {
    /// Borrowed view for handing to a [`HostApi`] implementation.
    ///
    /// No validation is repeated; the host checks what it uses.
    pub fn as_request(&self) -> SpawnRequest<'_> {
        SpawnRequest {
            path: &self.path,
            args: self.args.iter().map(Vec::as_slice).collect(),
            env: self
                .env
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.as_slice(),
                    value: value.as_slice(),
                })
                .collect(),
            redirects: self.redirects.iter().map(RedirectSpec::as_redirect).collect(),
            workdir: self.workdir,
            background: self.background,
        }
    }
}
