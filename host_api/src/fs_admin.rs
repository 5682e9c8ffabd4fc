//! Mount, unmount and device-node creation

use crate::error::{check_no_nul, check_path};
use crate::{HostApi, HostError};
use bitflags::bitflags;
use core_types::{DeviceId, RawFd};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use core_types::mkdev;

bitflags! {
    /// Mount options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MountFlags: u64 {
        const RDONLY = 1 << 0;
        const NOSUID = 1 << 1;
        const NODEV = 1 << 2;
        const NOEXEC = 1 << 3;
        const SYNCHRONOUS = 1 << 4;
        const REMOUNT = 1 << 5;
    }
}

/// A mount request. Every byte string is borrowed from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountRequest<'a> {
    source_fd: Option<RawFd>,
    source_path: &'a [u8],
    target_path: &'a [u8],
    fs_type: &'a [u8],
    flags: MountFlags,
    data: &'a [u8],
}

impl<'a> MountRequest<'a> {
    /// Builds a request mounting a `fs_type` filesystem at `target_path`.
    ///
    /// The source path is resolved against the working directory unless
    /// [`Self::with_source_fd`] names a directory descriptor.
    pub fn new(
        source_path: &'a [u8],
        target_path: &'a [u8],
        fs_type: &'a [u8],
    ) -> Result<Self, HostError> {
        check_no_nul("mount source", source_path)?;
        check_path("mount target", target_path)?;
        check_path("filesystem type", fs_type)?;
        Ok(Self {
            source_fd: None,
            source_path,
            target_path,
            fs_type,
            flags: MountFlags::empty(),
            data: &[],
        })
    }

    pub fn with_source_fd(mut self, fd: RawFd) -> Self {
        self.source_fd = Some(fd);
        self
    }

    pub fn with_flags(mut self, flags: MountFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Filesystem-specific options, passed through untouched.
    pub fn with_data(mut self, data: &'a [u8]) -> Self {
        self.data = data;
        self
    }

    pub fn source_fd(&self) -> Option<RawFd> {
        self.source_fd
    }

    pub fn source_path(&self) -> &'a [u8] {
        self.source_path
    }

    pub fn target_path(&self) -> &'a [u8] {
        self.target_path
    }

    pub fn fs_type(&self) -> &'a [u8] {
        self.fs_type
    }

    pub fn flags(&self) -> MountFlags {
        self.flags
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn to_spec(&self) -> MountSpec {
        MountSpec {
            source_fd: self.source_fd,
            source_path: self.source_path.to_vec(),
            target_path: self.target_path.to_vec(),
            fs_type: self.fs_type.to_vec(),
            flags: self.flags,
            data: self.data.to_vec(),
        }
    }
}

/// Wire form of [`MountRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source_fd: Option<RawFd>,
    pub source_path: Vec<u8>,
    pub target_path: Vec<u8>,
    pub fs_type: Vec<u8>,
    pub flags: MountFlags,
    pub data: Vec<u8>,
}

impl MountSpec {
    pub fn as_request(&self) -> MountRequest<'_> {
        MountRequest {
            source_fd: self.source_fd,
            source_path: &self.source_path,
            target_path: &self.target_path,
            fs_type: &self.fs_type,
            flags: self.flags,
            data: &self.data,
        }
    }
}

pub fn mount<H: HostApi + ?Sized>(host: &mut H, request: &MountRequest<'_>) -> Result<(), HostError> {
    if let Some(fd) = request.source_fd() {
        host.limits().check_fd(fd)?;
    }
    debug!(
        target_path = %String::from_utf8_lossy(request.target_path()),
        fs_type = %String::from_utf8_lossy(request.fs_type()),
        flags = request.flags().bits(),
        "mount"
    );
    host.mount(request)
}

pub fn umount<H: HostApi + ?Sized>(host: &mut H, path: &[u8]) -> Result<(), HostError> {
    check_path("umount path", path)?;
    debug!(path = %String::from_utf8_lossy(path), "umount");
    host.umount(path)
}

/// Creates a device node at `path`.
pub fn mknod<H: HostApi + ?Sized>(
    host: &mut H,
    path: &[u8],
    device: DeviceId,
) -> Result<(), HostError> {
    check_path("mknod path", path)?;
    debug!(path = %String::from_utf8_lossy(path), %device, "mknod");
    host.mknod(path, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingHost};

    #[test]
    fn test_mount_request_shape() {
        assert!(MountRequest::new(b"", b"/mnt", b"tmpfs").is_ok());
        assert!(MountRequest::new(b"dev", b"", b"devfs").is_err());
        assert!(MountRequest::new(b"dev", b"/mnt", b"").is_err());
        assert!(MountRequest::new(b"d\0v", b"/mnt", b"devfs").is_err());
    }

    #[test]
    fn test_mount_forwards_request() {
        let mut host = RecordingHost::new();
        let request = MountRequest::new(b"", b"/mnt", b"tmpfs")
            .unwrap()
            .with_flags(MountFlags::RDONLY | MountFlags::NOEXEC)
            .with_data(b"size=1m");
        mount(&mut host, &request).unwrap();
        assert_eq!(host.calls, vec![Call::Mount(request.to_spec())]);
        assert_eq!(request.to_spec().as_request(), request);
    }

    #[test]
    fn test_source_fd_checked() {
        let mut host = RecordingHost::new();
        let request = MountRequest::new(b"img", b"/mnt", b"tmpfs")
            .unwrap()
            .with_source_fd(-3);
        assert!(matches!(
            mount(&mut host, &request),
            Err(HostError::InvalidDescriptor { fd: -3, .. })
        ));
        assert!(host.calls.is_empty());
    }

    #[test]
    fn test_mknod_and_umount() {
        let mut host = RecordingHost::new();
        mknod(&mut host, b"/dev/ttyS0", mkdev(2, 1)).unwrap();
        umount(&mut host, b"/mnt").unwrap();
        assert!(umount(&mut host, b"").is_err());
        assert_eq!(
            host.calls,
            vec![
                Call::Mknod(b"/dev/ttyS0".to_vec(), mkdev(2, 1)),
                Call::Umount(b"/mnt".to_vec())
            ]
        );
    }
}
