//! In-memory filesystem
//!
//! Nodes are kept in a flat map keyed by normalized absolute path. A mount
//! hides everything below its target until it is unmounted again.

use crate::process::Program;
use core_types::{DeviceId, Errno};
use host_api::{HostError, MountFlags};
use std::collections::BTreeMap;

/// Normalized absolute path, e.g. `/tmp/a`
pub type HostPath = Vec<u8>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(FileNode),
    Device(DeviceId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNode {
    pub data: Vec<u8>,
    /// Opening for writing fails with `EACCES`
    pub readonly: bool,
    /// Behavior when spawned; files without one are not executable
    pub program: Option<Program>,
}

/// An active mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub source: HostPath,
    pub fs_type: String,
    pub flags: MountFlags,
    pub data: Vec<u8>,
    hidden: BTreeMap<HostPath, Node>,
}

impl MountPoint {
    pub fn new(source: HostPath, fs_type: String, flags: MountFlags, data: Vec<u8>) -> Self {
        Self {
            source,
            fs_type,
            flags,
            data,
            hidden: BTreeMap::new(),
        }
    }
}

/// Joins `path` onto `base` (unless absolute) and folds `.` and `..`.
pub fn resolve(base: &[u8], path: &[u8]) -> HostPath {
    let mut parts: Vec<&[u8]> = Vec::new();
    let start: &[u8] = if path.first() == Some(&b'/') { b"" } else { base };
    for part in start.split(|&b| b == b'/').chain(path.split(|&b| b == b'/')) {
        match part {
            b"" | b"." => {}
            b".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    let mut out = Vec::new();
    for part in &parts {
        out.push(b'/');
        out.extend_from_slice(part);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    out
}

/// Parent directory of a normalized path; `None` for the root.
pub fn parent(path: &[u8]) -> Option<&[u8]> {
    if path == b"/" {
        return None;
    }
    let cut = path.iter().rposition(|&b| b == b'/')?;
    Some(if cut == 0 { b"/" } else { &path[..cut] })
}

/// True when `path` is `dir` or lies below it.
pub fn is_within(path: &[u8], dir: &[u8]) -> bool {
    if dir == b"/" || path == dir {
        return true;
    }
    path.len() > dir.len() && path.starts_with(dir) && path[dir.len()] == b'/'
}

pub(crate) fn display(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

#[derive(Debug, Clone)]
pub struct Vfs {
    nodes: BTreeMap<HostPath, Node>,
    mounts: BTreeMap<HostPath, MountPoint>,
}

impl Vfs {
    /// A root with `/dev` and `/tmp`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        for dir in [b"/".as_slice(), b"/dev".as_slice(), b"/tmp".as_slice()] {
            nodes.insert(dir.to_vec(), Node::Dir);
        }
        Self {
            nodes,
            mounts: BTreeMap::new(),
        }
    }

    pub fn get(&self, path: &[u8]) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn get_mut(&mut self, path: &[u8]) -> Option<&mut Node> {
        self.nodes.get_mut(path)
    }

    pub fn contains(&self, path: &[u8]) -> bool {
        self.nodes.contains_key(path)
    }

    /// Fails unless the parent of `path` is an existing directory.
    pub fn check_parent(&self, path: &[u8]) -> Result<(), HostError> {
        let parent = parent(path).ok_or_else(|| {
            HostError::from_code(Errno::EEXIST, "the root always exists")
        })?;
        match self.nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(HostError::from_code(
                Errno::ENOTDIR,
                format!("{} is not a directory", display(parent)),
            )),
            None => Err(HostError::from_code(
                Errno::ENOENT,
                format!("{} does not exist", display(parent)),
            )),
        }
    }

    /// Fails with `EROFS` when `path` lies inside a read-only mount.
    pub fn check_writable(&self, path: &[u8]) -> Result<(), HostError> {
        let readonly = self
            .mounts
            .iter()
            .any(|(target, mount)| mount.flags.contains(MountFlags::RDONLY) && is_within(path, target));
        if readonly {
            return Err(HostError::from_code(
                Errno::EROFS,
                format!("{} is on a read-only mount", display(path)),
            ));
        }
        Ok(())
    }

    /// Inserts a node, replacing whatever was there.
    pub fn insert(&mut self, path: HostPath, node: Node) {
        self.nodes.insert(path, node);
    }

    /// Creates `path` and any missing parents as directories.
    pub fn create_dir_all(&mut self, path: &[u8]) {
        let mut current: Option<&[u8]> = Some(path);
        let mut missing = Vec::new();
        while let Some(dir) = current {
            if self.nodes.contains_key(dir) {
                break;
            }
            missing.push(dir.to_vec());
            current = parent(dir);
        }
        for dir in missing {
            self.nodes.insert(dir, Node::Dir);
        }
    }

    pub fn mount_point(&self, target: &[u8]) -> Option<&MountPoint> {
        self.mounts.get(target)
    }

    /// Mounts an empty filesystem over the directory at `target`.
    pub fn mount(&mut self, target: HostPath, mut mount: MountPoint) -> Result<(), HostError> {
        match self.nodes.get(&target) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(HostError::from_code(
                    Errno::ENOTDIR,
                    format!("{} is not a directory", display(&target)),
                ))
            }
            None => {
                return Err(HostError::from_code(
                    Errno::ENOENT,
                    format!("{} does not exist", display(&target)),
                ))
            }
        }
        if self.mounts.contains_key(&target) {
            return Err(HostError::from_code(
                Errno::EBUSY,
                format!("{} is already a mount point", display(&target)),
            ));
        }

        let below: Vec<HostPath> = self
            .nodes
            .keys()
            .filter(|path| path.as_slice() != target.as_slice() && is_within(path, &target))
            .cloned()
            .collect();
        for path in below {
            if let Some(node) = self.nodes.remove(&path) {
                mount.hidden.insert(path, node);
            }
        }
        self.mounts.insert(target, mount);
        Ok(())
    }

    /// Removes the mount at `target` and brings back what it hid.
    pub fn umount(&mut self, target: &[u8]) -> Result<MountPoint, HostError> {
        if !self.mounts.contains_key(target) {
            return Err(HostError::from_code(
                Errno::EINVAL,
                format!("{} is not a mount point", display(target)),
            ));
        }
        let nested = self
            .mounts
            .keys()
            .any(|other| other.as_slice() != target && is_within(other, target));
        if nested {
            return Err(HostError::from_code(
                Errno::EBUSY,
                format!("{} has mounts below it", display(target)),
            ));
        }
        let mount = self.mounts.remove(target).ok_or_else(|| {
            HostError::from_code(Errno::EINVAL, "mount vanished")
        })?;

        self.nodes
            .retain(|path, _| path.as_slice() == target || !is_within(path, target));
        self.nodes.extend(mount.hidden.clone());
        Ok(mount)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(data: &[u8]) -> Node {
        Node::File(FileNode {
            data: data.to_vec(),
            ..FileNode::default()
        })
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(b"/home", b"a/b"), b"/home/a/b");
        assert_eq!(resolve(b"/home", b"/etc"), b"/etc");
        assert_eq!(resolve(b"/home/u", b"../x/./y"), b"/home/x/y");
        assert_eq!(resolve(b"/", b".."), b"/");
    }

    #[test]
    fn test_parent_and_within() {
        assert_eq!(parent(b"/tmp/a"), Some(b"/tmp".as_slice()));
        assert_eq!(parent(b"/tmp"), Some(b"/".as_slice()));
        assert_eq!(parent(b"/"), None);
        assert!(is_within(b"/mnt/x", b"/mnt"));
        assert!(!is_within(b"/mntx", b"/mnt"));
    }

    #[test]
    fn test_check_parent() {
        let mut vfs = Vfs::new();
        vfs.insert(b"/tmp/f".to_vec(), file(b""));
        assert!(vfs.check_parent(b"/tmp/a").is_ok());
        assert_eq!(vfs.check_parent(b"/nope/a").unwrap_err().code(), Errno::ENOENT);
        assert_eq!(vfs.check_parent(b"/tmp/f/a").unwrap_err().code(), Errno::ENOTDIR);
    }

    #[test]
    fn test_mount_hides_and_umount_restores() {
        let mut vfs = Vfs::new();
        vfs.create_dir_all(b"/mnt/data");
        vfs.insert(b"/mnt/data/old".to_vec(), file(b"x"));

        let mount = MountPoint::new(Vec::new(), "tmpfs".to_string(), MountFlags::RDONLY, Vec::new());
        vfs.mount(b"/mnt".to_vec(), mount).unwrap();
        assert!(!vfs.contains(b"/mnt/data/old"));
        assert!(vfs.contains(b"/mnt"));
        assert_eq!(vfs.check_writable(b"/mnt/new").unwrap_err().code(), Errno::EROFS);

        vfs.umount(b"/mnt").unwrap();
        assert!(vfs.contains(b"/mnt/data/old"));
        assert!(vfs.check_writable(b"/mnt/new").is_ok());
    }

    #[test]
    fn test_mount_errors() {
        let mut vfs = Vfs::new();
        let mount = || MountPoint::new(Vec::new(), "tmpfs".to_string(), MountFlags::empty(), Vec::new());
        assert_eq!(
            vfs.mount(b"/nope".to_vec(), mount()).unwrap_err().code(),
            Errno::ENOENT
        );
        vfs.mount(b"/tmp".to_vec(), mount()).unwrap();
        assert_eq!(vfs.mount(b"/tmp".to_vec(), mount()).unwrap_err().code(), Errno::EBUSY);
        assert_eq!(vfs.umount(b"/dev").unwrap_err().code(), Errno::EINVAL);
    }
}
