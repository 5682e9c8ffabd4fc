//! Descriptor redirects applied when spawning a process
//!
//! A [`Redirect`] binds one descriptor slot of the child. Path variants
//! borrow their path for as long as the spawn request lives; nothing is
//! copied until the request is flattened into a [`RedirectSpec`] for the
//! wire.
//!
//! Redirects are applied by the host in array order, so a later redirect
//! for the same destination overrides an earlier one.

use crate::error::check_path;
use crate::{AbiLimits, HostError};
use core_types::RawFd;
use serde::{Deserialize, Serialize};

/// What a redirect does to its destination slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind<'a> {
    /// Open an existing file for reading
    Read(&'a [u8]),
    /// Create or truncate a file for writing
    Write(&'a [u8]),
    /// Create a file or open it at its end
    Append(&'a [u8]),
    /// Create a file or open it for reading and writing without truncation
    ReadWrite(&'a [u8]),
    /// Read end of a host-held pipe
    PipeIn,
    /// Write end of a host-held pipe
    PipeOut,
    /// Copy of another descriptor
    Duplicate { src_fd: RawFd },
    /// Leave the slot closed
    Close,
}

/// One descriptor binding for a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect<'a> {
    dst_fd: RawFd,
    kind: RedirectKind<'a>,
}

impl<'a> Redirect<'a> {
    pub fn read(dst_fd: RawFd, path: &'a [u8], limits: &AbiLimits) -> Result<Self, HostError> {
        Self::with_path(dst_fd, RedirectKind::Read(path), path, limits)
    }

    pub fn write(dst_fd: RawFd, path: &'a [u8], limits: &AbiLimits) -> Result<Self, HostError> {
        Self::with_path(dst_fd, RedirectKind::Write(path), path, limits)
    }

    pub fn append(dst_fd: RawFd, path: &'a [u8], limits: &AbiLimits) -> Result<Self, HostError> {
        Self::with_path(dst_fd, RedirectKind::Append(path), path, limits)
    }

    pub fn read_write(
        dst_fd: RawFd,
        path: &'a [u8],
        limits: &AbiLimits,
    ) -> Result<Self, HostError> {
        Self::with_path(dst_fd, RedirectKind::ReadWrite(path), path, limits)
    }

    pub fn pipe_in(dst_fd: RawFd, limits: &AbiLimits) -> Result<Self, HostError> {
        limits.check_fd(dst_fd)?;
        Ok(Self::unchecked(dst_fd, RedirectKind::PipeIn))
    }

    pub fn pipe_out(dst_fd: RawFd, limits: &AbiLimits) -> Result<Self, HostError> {
        limits.check_fd(dst_fd)?;
        Ok(Self::unchecked(dst_fd, RedirectKind::PipeOut))
    }

    /// Makes `dst_fd` a copy of `src_fd`.
    pub fn duplicate(src_fd: RawFd, dst_fd: RawFd, limits: &AbiLimits) -> Result<Self, HostError> {
        limits.check_fd(src_fd)?;
        limits.check_fd(dst_fd)?;
        Ok(Self::unchecked(dst_fd, RedirectKind::Duplicate { src_fd }))
    }

    pub fn close(dst_fd: RawFd, limits: &AbiLimits) -> Result<Self, HostError> {
        limits.check_fd(dst_fd)?;
        Ok(Self::unchecked(dst_fd, RedirectKind::Close))
    }

    fn with_path(
        dst_fd: RawFd,
        kind: RedirectKind<'a>,
        path: &[u8],
        limits: &AbiLimits,
    ) -> Result<Self, HostError> {
        limits.check_fd(dst_fd)?;
        check_path("redirect path", path)?;
        Ok(Self::unchecked(dst_fd, kind))
    }

    /// Host-side view of a wire redirect; the host re-validates what it uses.
    pub(crate) fn unchecked(dst_fd: RawFd, kind: RedirectKind<'a>) -> Self {
        Self { dst_fd, kind }
    }

    pub fn dst_fd(&self) -> RawFd {
        self.dst_fd
    }

    pub fn kind(&self) -> RedirectKind<'a> {
        self.kind
    }

    /// Path carried by the open variants.
    pub fn path(&self) -> Option<&'a [u8]> {
        match self.kind {
            RedirectKind::Read(path)
            | RedirectKind::Write(path)
            | RedirectKind::Append(path)
            | RedirectKind::ReadWrite(path) => Some(path),
            _ => None,
        }
    }

    /// Owned wire form.
    pub fn to_spec(&self) -> RedirectSpec {
        let op = match self.kind {
            RedirectKind::Read(path) => RedirectOp::Read { path: path.to_vec() },
            RedirectKind::Write(path) => RedirectOp::Write { path: path.to_vec() },
            RedirectKind::Append(path) => RedirectOp::Append { path: path.to_vec() },
            RedirectKind::ReadWrite(path) => RedirectOp::ReadWrite { path: path.to_vec() },
            RedirectKind::PipeIn => RedirectOp::PipeIn,
            RedirectKind::PipeOut => RedirectOp::PipeOut,
            RedirectKind::Duplicate { src_fd } => RedirectOp::Duplicate { src_fd },
            RedirectKind::Close => RedirectOp::Close,
        };
        RedirectSpec {
            dst_fd: self.dst_fd,
            op,
        }
    }
}

/// Wire form of [`RedirectKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RedirectOp {
    Read { path: Vec<u8> },
    Write { path: Vec<u8> },
    Append { path: Vec<u8> },
    ReadWrite { path: Vec<u8> },
    PipeIn,
    PipeOut,
    Duplicate { src_fd: RawFd },
    Close,
}

/// Wire form of [`Redirect`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectSpec {
    pub dst_fd: RawFd,
    pub op: RedirectOp,
}

impl RedirectSpec {
    /// Borrowed view over this spec.
    pub fn as_redirect(&self) -> Redirect<'_> {
        let kind = match &self.op {
            RedirectOp::Read { path } => RedirectKind::Read(path),
            RedirectOp::Write { path } => RedirectKind::Write(path),
            RedirectOp::Append { path } => RedirectKind::Append(path),
            RedirectOp::ReadWrite { path } => RedirectKind::ReadWrite(path),
            RedirectOp::PipeIn => RedirectKind::PipeIn,
            RedirectOp::PipeOut => RedirectKind::PipeOut,
            RedirectOp::Duplicate { src_fd } => RedirectKind::Duplicate { src_fd: *src_fd },
            RedirectOp::Close => RedirectKind::Close,
        };
        Redirect::unchecked(self.dst_fd, kind)
    }
}
