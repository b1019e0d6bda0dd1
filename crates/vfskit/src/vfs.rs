//! The manager: path resolution, permission checks, the descriptor table
//! and the POSIX-shaped operation surface.
//!
//! One `Vfs` value represents the whole process: it owns the root inode,
//! the working directory, the standard-IO inodes, the descriptor table,
//! the open directory iterators, the live memory mappings and the umask.
//! Construct it once through [`VfsBuilder`] and share it (`Arc`) between
//! cooperating threads; blocking operations suspend through the scheduler
//! hook, never while holding an inode lock.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::fd::{self, Fd, FileDescriptor};
use crate::file::{Link, RegularFile, StandardInput, WriteOnlyFile};
use crate::flags::{AccessMode, AtFlags, MapFlags, MsgFlags, OpenFlags, Seek, SocketKind};
use crate::inode::{ino, DataItem, Inode, Node, SocketFlavor, WeakNode};
use crate::limits::{CURRENT_DIRECTORY, FILE_DESCRIPTOR_LIMIT, FILE_NAME_LIMIT, PATH_LIMIT};
use crate::mmap::{MapAddr, Mapping};
use crate::mode::Mode;
use crate::path;
use crate::pipe::Pipe;
use crate::sched::{Scheduler, YieldScheduler};
use crate::snapshot::{EntryKind, SnapshotEntry};
use crate::socket::{DatagramSocket, SeqPacketSocket, SocketAddress, StreamSocket};

/// Inode metadata, as reported by the `stat` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: u64,
    pub mode: Mode,
    pub nlink: u64,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub block_size: u64,
    pub blocks: u64,
}

/// One entry yielded by a directory iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: String,
}

/// Opaque handle to an open directory iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(usize);

#[derive(Debug)]
struct DirIter {
    handle: usize,
    fd: i32,
    node: Node,
    cursor: usize,
}

#[derive(Debug, Default)]
struct DirTable {
    next: usize,
    iters: Vec<DirIter>,
}

#[derive(Debug)]
struct MapTable {
    next_addr: usize,
    maps: Vec<Mapping>,
}

impl Default for MapTable {
    fn default() -> Self {
        // Synthetic addresses; page-sized steps keep them distinct and
        // recognisable in traces.
        Self {
            next_addr: 0x1000,
            maps: Vec::new(),
        }
    }
}

enum NodeInit {
    Empty,
    FileSnapshot(&'static [u8]),
    LinkTarget(String),
}

/// The process-wide virtual filesystem.
pub struct Vfs {
    root: Node,
    cwd: Mutex<WeakNode>,
    fds: Mutex<Vec<Option<Fd>>>,
    dirs: Mutex<DirTable>,
    maps: Mutex<MapTable>,
    umask: Mutex<Mode>,
    sched: Arc<dyn Scheduler>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// An empty filesystem with default settings.
    pub fn new() -> Self {
        VfsBuilder::default().build()
    }

    /// Start configuring a filesystem.
    pub fn builder() -> VfsBuilder {
        VfsBuilder::default()
    }

    // --- resolution ---

    fn current_directory(&self) -> Result<Node> {
        self.cwd.lock().upgrade().ok_or(Error::NotFound)
    }

    /// Starting node for resolution: the root for absolute paths, the
    /// working directory for `CURRENT_DIRECTORY`, else the inode behind
    /// `dirfd` (which must be a searchable directory).
    fn base_node(&self, dirfd: i32, name: &str) -> Result<Node> {
        if path::is_absolute(name) {
            return Ok(self.root.clone());
        }
        if dirfd == CURRENT_DIRECTORY {
            return self.current_directory();
        }
        let node = self.descriptor(dirfd)?.lock().node().clone();
        if !node.mode().is_directory() {
            return Err(Error::NotADirectory);
        }
        self.check_grants(&node, Mode::XUSER)?;
        Ok(node)
    }

    fn check_grants(&self, node: &Node, grant: Mode) -> Result<()> {
        if node.mode().grants(grant) {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    fn resolve_at(&self, dirfd: i32, name: &str, follow: bool) -> Result<Option<Node>> {
        self.resolve_checked(dirfd, name, follow, |_| Ok(()))
    }

    /// Walk `name` from its base, expanding symlinks with loop detection
    /// and applying `checker` to every node traversed. Returns `None`
    /// only when the final component is missing from an existing parent.
    fn resolve_checked(
        &self,
        dirfd: i32,
        name: &str,
        follow: bool,
        checker: impl Fn(&Node) -> Result<()>,
    ) -> Result<Option<Node>> {
        if name.len() > PATH_LIMIT {
            return Err(Error::NameTooLong);
        }
        let base = self.base_node(dirfd, name)?;
        let name = path::normalize(name);
        let mut current = base;
        let mut item = current.clone();
        let mut queue: VecDeque<String> = path::split(&name).into();
        let mut visited: HashSet<u64> = HashSet::new();

        while let Some(component) = queue.pop_front() {
            if !current.mode().is_directory() {
                return Err(Error::NotADirectory);
            }
            self.check_grants(&current, Mode::XUSER)?;
            if component.len() > FILE_NAME_LIMIT {
                return Err(Error::NameTooLong);
            }
            let found = match &*current.data() {
                DataItem::Directory(d) => d.find(&component),
                _ => return Err(Error::NotADirectory),
            };
            let node = match found {
                Some(n) => n,
                None if queue.is_empty() => return Ok(None),
                None => return Err(Error::NotFound),
            };
            checker(&node)?;

            let mode = node.mode();
            if mode.is_directory() {
                current = node.clone();
                item = node;
            } else if mode.is_link() && (follow || !queue.is_empty()) {
                if !visited.insert(ino(&node)) {
                    return Err(Error::LinkLoop);
                }
                let target = match &*node.data() {
                    DataItem::Link(l) => l.target().to_owned(),
                    _ => return Err(Error::InvalidArgument),
                };
                let mut expanded: VecDeque<String> = path::split(&target).into();
                expanded.extend(queue.drain(..));
                queue = expanded;
                if path::is_absolute(&target) {
                    current = self.root.clone();
                    item = self.root.clone();
                }
            } else if queue.is_empty() {
                item = node;
                break;
            } else {
                return Err(Error::NotADirectory);
            }
        }
        Ok(Some(item))
    }

    /// Resolve the directory that would hold `name`'s final component.
    fn dir_of(&self, dirfd: i32, name: &str) -> Result<(Node, String)> {
        let name = path::normalize(name);
        if name.len() > PATH_LIMIT {
            return Err(Error::NameTooLong);
        }
        let (dir_part, file_name) = path::split_file_name(&name);
        let item = self
            .resolve_at(dirfd, dir_part, true)?
            .ok_or(Error::NotFound)?;
        if !item.mode().is_directory() {
            return Err(Error::NotADirectory);
        }
        self.check_grants(&item, Mode::XUSER)?;
        Ok((item, file_name.to_owned()))
    }

    // --- descriptor table ---

    fn descriptor(&self, fd: i32) -> Result<Fd> {
        let idx = usize::try_from(fd).map_err(|_| Error::BadDescriptor)?;
        self.fds
            .lock()
            .get(idx)
            .and_then(Clone::clone)
            .ok_or(Error::BadDescriptor)
    }

    /// Install a descriptor in the lowest free slot at or above `low`.
    fn install(&self, f: Fd, low: usize) -> Result<i32> {
        if low >= FILE_DESCRIPTOR_LIMIT {
            return Err(Error::InvalidArgument);
        }
        let mut fds = self.fds.lock();
        if fds.len() <= low {
            fds.resize_with(low + 1, || None);
        }
        if let Some(free) = fds.iter().skip(low).position(Option::is_none) {
            let idx = low + free;
            fds[idx] = Some(f);
            return Ok(idx as i32);
        }
        if fds.len() >= FILE_DESCRIPTOR_LIMIT {
            return Err(Error::DescriptorLimit);
        }
        fds.push(Some(f));
        Ok((fds.len() - 1) as i32)
    }

    // --- node creation ---

    fn create_node(&self, dirfd: i32, name: &str, mode_raw: u32, init: NodeInit) -> Result<Node> {
        if name.is_empty() {
            return Err(Error::NotFound);
        }
        let (dir_node, file_name) = self.dir_of(dirfd, name)?;
        self.check_grants(&dir_node, Mode::WUSER)?;

        let umask = *self.umask.lock();
        let mut mode = Mode::from_raw(
            mode_raw & !umask.bits() & (Mode::TYPE_MASK | Mode::GRANTS.bits()),
        );
        if mode.is_directory() {
            mode |= Mode::SET_GID;
        }

        let type_bits = mode.bits() & Mode::TYPE_MASK;
        let node = if type_bits == Mode::SOCKET.bits() {
            match init {
                NodeInit::Empty => {
                    Inode::new(mode, DataItem::DatagramSocket(DatagramSocket::new()))
                }
                _ => return Err(Error::InvalidArgument),
            }
        } else if type_bits == Mode::LINK.bits() {
            match init {
                NodeInit::LinkTarget(target) => {
                    Inode::new(mode, DataItem::Link(Link::new(target)?))
                }
                _ => return Err(Error::InvalidArgument),
            }
        } else if type_bits == Mode::FILE.bits() {
            let file = match init {
                NodeInit::Empty => RegularFile::new(),
                NodeInit::FileSnapshot(bytes) => RegularFile::from_snapshot(bytes),
                NodeInit::LinkTarget(_) => return Err(Error::InvalidArgument),
            };
            Inode::new(mode, DataItem::File(file))
        } else if type_bits == Mode::DIRECTORY.bits() {
            Inode::new_directory(mode, Some(&dir_node))
        } else if type_bits == Mode::FIFO.bits() {
            match init {
                NodeInit::Empty => Inode::new(mode, DataItem::Fifo(Pipe::new())),
                _ => return Err(Error::InvalidArgument),
            }
        } else if type_bits == Mode::CHAR_DEVICE.bits() || type_bits == Mode::BLOCK_DEVICE.bits() {
            return Err(Error::NotPermitted);
        } else {
            return Err(Error::InvalidArgument);
        };

        match &mut *dir_node.data() {
            DataItem::Directory(d) => d.create(file_name.clone(), node.clone())?,
            _ => return Err(Error::NotADirectory),
        }
        debug!(name = %file_name, mode = mode.bits(), "created node");
        Ok(node)
    }

    /// Create a node of the kind named by `mode`'s type nibble, with the
    /// permission bits masked by the umask. Character and block devices
    /// are refused.
    pub fn create_node_at(&self, dirfd: i32, name: &str, mode: u32) -> Result<()> {
        self.create_node(dirfd, name, mode, NodeInit::Empty).map(|_| ())
    }

    /// Create a symbolic link whose target is fixed forever.
    pub fn create_symlink_at(&self, dirfd: i32, name: &str, target: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::NotFound);
        }
        if target.len() > PATH_LIMIT {
            return Err(Error::NameTooLong);
        }
        let mode = Mode::LINK.bits() | Mode::GRANTS.bits();
        self.create_node(dirfd, name, mode, NodeInit::LinkTarget(target.to_owned()))
            .map(|_| ())
    }

    /// Link an existing non-directory inode under a second name.
    pub fn create_hard_link_at(
        &self,
        newdirfd: i32,
        name: &str,
        olddirfd: i32,
        target: &str,
        flags: AtFlags,
    ) -> Result<()> {
        if name.is_empty() || target.is_empty() {
            return Err(Error::NotFound);
        }
        let (dir_node, file_name) = self.dir_of(newdirfd, name)?;
        self.check_grants(&dir_node, Mode::WUSER)?;

        let target_node = self
            .resolve_at(olddirfd, target, flags.contains(AtFlags::SYM_FOLLOW))?
            .ok_or(Error::NotFound)?;
        if target_node.mode().is_directory() {
            return Err(Error::NotPermitted);
        }
        let result = match &mut *dir_node.data() {
            DataItem::Directory(d) => d.create(file_name, target_node),
            _ => Err(Error::NotADirectory),
        };
        result
    }

    /// The target recorded in a symlink.
    pub fn read_link_at(&self, dirfd: i32, name: &str) -> Result<String> {
        let node = self
            .resolve_at(dirfd, name, false)?
            .ok_or(Error::NotFound)?;
        if !node.mode().is_link() {
            return Err(Error::InvalidArgument);
        }
        let result = match &*node.data() {
            DataItem::Link(l) => Ok(l.target().to_owned()),
            _ => Err(Error::InvalidArgument),
        };
        result
    }

    /// Check the caller's access to a path, per the user permission bits.
    pub fn access_at(
        &self,
        dirfd: i32,
        name: &str,
        mode: AccessMode,
        flags: AtFlags,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::NotFound);
        }
        let item = self
            .resolve_at(dirfd, name, !flags.contains(AtFlags::SYM_NOFOLLOW))?
            .ok_or(Error::NotFound)?;
        let m = item.mode();
        if (mode.contains(AccessMode::READ) && !m.user_read())
            || (mode.contains(AccessMode::WRITE) && !m.user_write())
            || (mode.contains(AccessMode::EXECUTE) && !m.user_execute())
        {
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    // --- open / close / dup ---

    /// Open a file, optionally creating it, and return its descriptor.
    pub fn open_file_at(
        &self,
        dirfd: i32,
        name: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<i32> {
        if name.is_empty() {
            return Err(Error::NotFound);
        }
        let resolved =
            self.resolve_at(dirfd, name, !flags.contains(OpenFlags::SYM_NOFOLLOW))?;
        let file = match resolved {
            Some(node) => {
                if flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::EXCL) {
                    return Err(Error::Exists);
                }
                node
            }
            None if flags.contains(OpenFlags::CREATE) => {
                self.create_node(dirfd, name, mode | Mode::FILE.bits(), NodeInit::Empty)?
            }
            None => return Err(Error::NotFound),
        };

        let m = file.mode();
        if m.is_socket() || m.is_char_device() || m.is_block_device() {
            return Err(Error::NoDevice);
        }
        if flags.contains(OpenFlags::READ) {
            self.check_grants(&file, Mode::RUSER)?;
        }
        if flags.contains(OpenFlags::WRITE) {
            self.check_grants(&file, Mode::WUSER)?;
            if m.is_directory() {
                return Err(Error::IsADirectory);
            }
            if flags.contains(OpenFlags::TRUNCATE) {
                match &mut *file.data() {
                    DataItem::File(f) => f.clear(),
                    DataItem::Fifo(_) => return Err(Error::InvalidArgument),
                    _ => {}
                }
            }
        }

        let mut fl = flags;
        if fl.contains(OpenFlags::NO_ACCESS) {
            fl.remove(OpenFlags::READ);
            fl.remove(OpenFlags::WRITE);
        }
        if m.is_fifo() {
            if let DataItem::Fifo(p) = &mut *file.data() {
                if fl.contains(OpenFlags::READ) {
                    p.assign_reader(&*self.sched);
                }
                if fl.contains(OpenFlags::WRITE) {
                    p.assign_writer(&*self.sched);
                }
            }
        }
        self.install(Arc::new(Mutex::new(FileDescriptor::new(file, fl))), 0)
    }

    /// Release a descriptor slot. The last close of a pipe end or socket
    /// updates the inode's end-of-stream state.
    pub fn close_file(&self, fd: i32) -> Result<()> {
        let idx = usize::try_from(fd).map_err(|_| Error::BadDescriptor)?;
        let taken = {
            let mut fds = self.fds.lock();
            fds.get_mut(idx)
                .and_then(Option::take)
                .ok_or(Error::BadDescriptor)?
        };
        drop(taken);
        Ok(())
    }

    /// Duplicate into the lowest free slot.
    pub fn duplicate(&self, fd: i32) -> Result<i32> {
        self.duplicate_from(fd, 0)
    }

    /// Duplicate into the lowest free slot at or above `low_edge`.
    pub fn duplicate_from(&self, fd: i32, low_edge: i32) -> Result<i32> {
        let low = usize::try_from(low_edge).map_err(|_| Error::InvalidArgument)?;
        self.install(self.descriptor(fd)?, low)
    }

    /// Duplicate onto a specific slot, closing whatever occupied it.
    /// `duplicate2(fd, fd)` returns `fd` without touching the slot.
    pub fn duplicate2(&self, oldfd: i32, newfd: i32) -> Result<i32> {
        if oldfd == newfd {
            return Ok(newfd);
        }
        let f = self.descriptor(oldfd)?;
        let idx = usize::try_from(newfd).map_err(|_| Error::BadDescriptor)?;
        if idx > FILE_DESCRIPTOR_LIMIT {
            return Err(Error::BadDescriptor);
        }
        let previous = {
            let mut fds = self.fds.lock();
            if fds.len() <= idx {
                fds.resize_with(idx + 1, || None);
            }
            std::mem::replace(&mut fds[idx], Some(f))
        };
        drop(previous);
        Ok(newfd)
    }

    /// An anonymous pipe; returns `(read_end, write_end)`.
    pub fn pipe(&self) -> Result<(i32, i32)> {
        let node = Inode::new(Mode::FIFO | Mode::RWXUSER, DataItem::Fifo(Pipe::new()));
        if let DataItem::Fifo(p) = &mut *node.data() {
            p.assign_reader(&*self.sched);
            p.assign_writer(&*self.sched);
        }
        let r = self.install(
            Arc::new(Mutex::new(FileDescriptor::new(node.clone(), OpenFlags::READ))),
            0,
        )?;
        let w = self.install(
            Arc::new(Mutex::new(FileDescriptor::new(node, OpenFlags::WRITE))),
            0,
        )?;
        Ok((r, w))
    }

    // --- unlink / rename ---

    pub fn remove_file(&self, name: &str) -> Result<()> {
        self.remove_file_at(CURRENT_DIRECTORY, name)
    }

    pub fn remove_file_at(&self, dirfd: i32, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::NotFound);
        }
        let (dir_node, file_name) = self.dir_of(dirfd, name)?;
        self.check_grants(&dir_node, Mode::WUSER)?;
        let result = match &mut *dir_node.data() {
            DataItem::Directory(d) => d.remove(&file_name),
            _ => Err(Error::NotADirectory),
        };
        result
    }

    pub fn remove_directory(&self, name: &str) -> Result<()> {
        self.remove_directory_at(CURRENT_DIRECTORY, name)
    }

    pub fn remove_directory_at(&self, dirfd: i32, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::NotFound);
        }
        let (dir_node, file_name) = self.dir_of(dirfd, name)?;
        self.check_grants(&dir_node, Mode::WUSER)?;
        let result = match &mut *dir_node.data() {
            DataItem::Directory(d) => d.remove_directory(&file_name),
            _ => Err(Error::NotADirectory),
        };
        result
    }

    /// `unlinkat`: removes a file, or a directory under `REMOVE_DIR`.
    pub fn remove_at(&self, dirfd: i32, name: &str, flags: AtFlags) -> Result<()> {
        if flags.contains(AtFlags::REMOVE_DIR) {
            self.remove_directory_at(dirfd, name)
        } else if flags.is_empty() {
            self.remove_file_at(dirfd, name)
        } else {
            Err(Error::InvalidArgument)
        }
    }

    /// Atomically relink `oldpath` as `newpath`. A path that traverses
    /// the renamed node itself is rejected.
    pub fn rename_at(
        &self,
        newdirfd: i32,
        newpath: &str,
        olddirfd: i32,
        oldpath: &str,
    ) -> Result<()> {
        let (old_dir, old_name) = self.dir_of(olddirfd, oldpath)?;
        self.check_grants(&old_dir, Mode::WUSER)?;
        let old_node = match &*old_dir.data() {
            DataItem::Directory(d) => d.find(&old_name),
            _ => None,
        }
        .ok_or(Error::NotFound)?;

        let existing = self.resolve_checked(newdirfd, newpath, false, |n| {
            if Arc::ptr_eq(n, &old_node) {
                Err(Error::InvalidArgument)
            } else {
                Ok(())
            }
        })?;

        let (new_dir, new_name) = self.dir_of(newdirfd, newpath)?;
        self.check_grants(&new_dir, Mode::WUSER)?;

        match existing {
            None => match &mut *new_dir.data() {
                DataItem::Directory(d) => d.create(new_name.clone(), old_node.clone())?,
                _ => return Err(Error::NotADirectory),
            },
            Some(target) => {
                if old_node.mode().is_directory() {
                    if !target.mode().is_directory() {
                        return Err(Error::NotADirectory);
                    }
                    if target.size() > 2 {
                        return Err(Error::NotEmpty);
                    }
                } else if target.mode().is_directory() {
                    return Err(Error::IsADirectory);
                }
                match &mut *new_dir.data() {
                    DataItem::Directory(d) => d.replace_entry(&new_name, old_node.clone()),
                    _ => return Err(Error::NotADirectory),
                }
            }
        }
        if let DataItem::Directory(d) = &mut *old_dir.data() {
            d.force_remove(&old_name);
        }
        debug!(from = %oldpath, to = %newpath, "renamed");
        Ok(())
    }

    // --- offsets, sizes, metadata ---

    /// Move a descriptor's offset. Pipes and sockets are not seekable.
    pub fn seek(&self, fd: i32, offset: i64, whence: Seek) -> Result<u64> {
        let f = self.descriptor(fd)?;
        let mut f = f.lock();
        let m = f.node().mode();
        if m.is_fifo() || m.is_socket() {
            return Err(Error::IllegalSeek);
        }
        let base = match whence {
            Seek::Set => 0,
            Seek::Current => f.offset() as i64,
            Seek::End => f.size() as i64,
        };
        let target = base.checked_add(offset).ok_or(Error::Overflow)?;
        if target < 0 {
            return Err(Error::InvalidArgument);
        }
        f.set_offset(target as usize);
        Ok(target as u64)
    }

    pub fn truncate(&self, name: &str, length: i64) -> Result<()> {
        let node = self
            .resolve_at(CURRENT_DIRECTORY, name, true)?
            .ok_or(Error::NotFound)?;
        self.truncate_node(&node, length)
    }

    /// `ftruncate`: requires a descriptor opened for writing.
    pub fn ftruncate(&self, fd: i32, length: i64) -> Result<()> {
        let f = self.descriptor(fd)?;
        let node = {
            let g = f.lock();
            if !g.flags().contains(OpenFlags::WRITE) {
                return Err(Error::InvalidArgument);
            }
            g.node().clone()
        };
        self.truncate_node(&node, length)
    }

    fn truncate_node(&self, node: &Node, length: i64) -> Result<()> {
        if length < 0 {
            return Err(Error::InvalidArgument);
        }
        let m = node.mode();
        if m.is_directory() {
            return Err(Error::IsADirectory);
        }
        if !m.is_file() {
            return Err(Error::InvalidArgument);
        }
        self.check_grants(node, Mode::WUSER)?;
        match &mut *node.data() {
            DataItem::File(f) => {
                f.resize(length as usize);
                Ok(())
            }
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn stat(&self, name: &str) -> Result<Stat> {
        let node = self
            .resolve_at(CURRENT_DIRECTORY, name, true)?
            .ok_or(Error::NotFound)?;
        Ok(self.stat_node(&node))
    }

    /// Like [`Vfs::stat`] but does not follow a final symlink.
    pub fn lstat(&self, name: &str) -> Result<Stat> {
        let node = self
            .resolve_at(CURRENT_DIRECTORY, name, false)?
            .ok_or(Error::NotFound)?;
        Ok(self.stat_node(&node))
    }

    pub fn fstat(&self, fd: i32) -> Result<Stat> {
        let node = self.descriptor(fd)?.lock().node().clone();
        Ok(self.stat_node(&node))
    }

    fn stat_node(&self, node: &Node) -> Stat {
        let size = node.size() as u64;
        Stat {
            ino: ino(node),
            mode: node.mode(),
            nlink: Arc::strong_count(node) as u64,
            size,
            uid: node.uid(),
            gid: node.gid(),
            block_size: 512,
            blocks: (size + 1) / 512,
        }
    }

    // --- working directory, modes, umask ---

    pub fn change_directory(&self, name: &str) -> Result<()> {
        let node = self
            .resolve_at(CURRENT_DIRECTORY, name, true)?
            .ok_or(Error::NotFound)?;
        self.change_directory_node(node)
    }

    pub fn change_directory_fd(&self, fd: i32) -> Result<()> {
        let node = self.descriptor(fd)?.lock().node().clone();
        self.change_directory_node(node)
    }

    fn change_directory_node(&self, node: Node) -> Result<()> {
        if !node.mode().is_directory() {
            return Err(Error::NotADirectory);
        }
        self.check_grants(&node, Mode::XUSER)?;
        *self.cwd.lock() = Arc::downgrade(&node);
        Ok(())
    }

    pub fn chmod(&self, name: &str, mode: u32) -> Result<()> {
        self.chmod_at(CURRENT_DIRECTORY, name, mode, AtFlags::empty())
    }

    pub fn chmod_at(&self, dirfd: i32, name: &str, mode: u32, flags: AtFlags) -> Result<()> {
        let node = self
            .resolve_at(dirfd, name, !flags.contains(AtFlags::SYM_NOFOLLOW))?
            .ok_or(Error::NotFound)?;
        self.apply_chmod(&node, mode);
        Ok(())
    }

    pub fn fchmod(&self, fd: i32, mode: u32) -> Result<()> {
        let node = self.descriptor(fd)?.lock().node().clone();
        self.apply_chmod(&node, mode);
        Ok(())
    }

    fn apply_chmod(&self, node: &Node, mode: u32) {
        let updated =
            (node.mode().bits() & !Mode::CHMOD_MASK) | (mode & Mode::CHMOD_MASK);
        node.set_mode(Mode::from_raw(updated));
    }

    /// The current umask's permission bits.
    pub fn umask(&self) -> u32 {
        self.umask.lock().bits()
    }

    /// Install a new umask and return the previous one.
    pub fn set_umask(&self, mask: u32) -> u32 {
        let new = Mode::from_raw(mask & Mode::GRANTS.bits());
        std::mem::replace(&mut *self.umask.lock(), new).bits()
    }

    // --- descriptor-level I/O ---

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        let f = self.descriptor(fd)?;
        let mut f = f.lock();
        let n = f.read(&*self.sched, buf)?;
        trace!(fd, n, "read");
        Ok(n)
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> Result<usize> {
        let f = self.descriptor(fd)?;
        let mut f = f.lock();
        let n = f.write(&*self.sched, buf)?;
        trace!(fd, n, "write");
        Ok(n)
    }

    /// Positional read; never moves the descriptor offset.
    pub fn read_at(&self, fd: i32, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let f = self.descriptor(fd)?;
        let f = f.lock();
        f.read_at(offset, buf)
    }

    /// Positional write; ignores APPEND, per POSIX.
    pub fn write_at(&self, fd: i32, offset: usize, buf: &[u8]) -> Result<usize> {
        let f = self.descriptor(fd)?;
        let f = f.lock();
        f.write_at(offset, buf)
    }

    /// The open-flag word (`F_GETFL`).
    pub fn descriptor_flags(&self, fd: i32) -> Result<OpenFlags> {
        Ok(self.descriptor(fd)?.lock().flags())
    }

    /// `F_SETFL`: may set APPEND and toggle NONBLOCK; clearing APPEND is
    /// not permitted.
    pub fn set_descriptor_flags(&self, fd: i32, flags: OpenFlags) -> Result<()> {
        let f = self.descriptor(fd)?;
        let mut f = f.lock();
        let mut fl = f.flags();
        if flags.contains(OpenFlags::APPEND) {
            fl |= OpenFlags::APPEND;
        } else if fl.contains(OpenFlags::APPEND) {
            return Err(Error::NotPermitted);
        }
        if flags.contains(OpenFlags::NONBLOCK) {
            fl |= OpenFlags::NONBLOCK;
        } else {
            fl.remove(OpenFlags::NONBLOCK);
        }
        f.set_flags(fl);
        Ok(())
    }

    /// `fsync`/`fdatasync`/`syncfs`: storage is memory, so validating the
    /// descriptor is the whole job.
    pub fn sync_descriptor(&self, fd: i32) -> Result<()> {
        self.descriptor(fd).map(|_| ())
    }

    /// `isatty`: nothing in this filesystem is a terminal.
    pub fn is_terminal(&self, fd: i32) -> Result<bool> {
        self.descriptor(fd).map(|_| false)
    }

    // --- directory iterators ---

    /// Open an iterator over the directory behind `fd`. The iterator owns
    /// a cursor, not a snapshot: entries added or removed while it is open
    /// are observed positionally.
    pub fn open_directory(&self, fd: i32) -> Result<DirHandle> {
        let node = self.descriptor(fd)?.lock().node().clone();
        if !node.mode().is_directory() {
            return Err(Error::NotADirectory);
        }
        self.check_grants(&node, Mode::RUSER | Mode::XUSER)?;
        let mut dirs = self.dirs.lock();
        dirs.next += 1;
        let handle = dirs.next;
        dirs.iters.push(DirIter {
            handle,
            fd,
            node,
            cursor: 0,
        });
        Ok(DirHandle(handle))
    }

    fn with_iter<R>(&self, handle: DirHandle, f: impl FnOnce(&mut DirIter) -> R) -> Result<R> {
        let mut dirs = self.dirs.lock();
        let iter = dirs
            .iters
            .iter_mut()
            .find(|i| i.handle == handle.0)
            .ok_or(Error::BadDescriptor)?;
        Ok(f(iter))
    }

    /// The entry under the cursor, or `None` at end of directory.
    pub fn directory_get(&self, handle: DirHandle) -> Result<Option<DirEntry>> {
        self.with_iter(handle, |iter| {
            let listing = match &*iter.node.data() {
                DataItem::Directory(d) => d.list(),
                _ => Vec::new(),
            };
            listing.get(iter.cursor).map(|(name, node)| DirEntry {
                ino: ino(node),
                name: name.clone(),
            })
        })
    }

    pub fn directory_next(&self, handle: DirHandle) -> Result<()> {
        self.with_iter(handle, |iter| iter.cursor += 1)
    }

    pub fn directory_rewind(&self, handle: DirHandle) -> Result<()> {
        self.with_iter(handle, |iter| iter.cursor = 0)
    }

    pub fn directory_tell(&self, handle: DirHandle) -> Result<usize> {
        self.with_iter(handle, |iter| iter.cursor)
    }

    pub fn directory_seek(&self, handle: DirHandle, position: usize) -> Result<()> {
        self.with_iter(handle, |iter| iter.cursor = position)
    }

    /// The descriptor backing the iterator.
    pub fn directory_fd(&self, handle: DirHandle) -> Result<i32> {
        self.with_iter(handle, |iter| iter.fd)
    }

    /// Drop the iterator and close its backing descriptor.
    pub fn close_directory(&self, handle: DirHandle) -> Result<()> {
        let iter = {
            let mut dirs = self.dirs.lock();
            let idx = dirs
                .iters
                .iter()
                .position(|i| i.handle == handle.0)
                .ok_or(Error::BadDescriptor)?;
            dirs.iters.remove(idx)
        };
        self.close_file(iter.fd)
    }

    // --- sockets ---

    fn socket_descriptor(&self, fd: i32) -> Result<(Fd, Node)> {
        let f = self.descriptor(fd)?;
        let node = f.lock().node().clone();
        if !node.data().is_socket() {
            return Err(Error::NotASocket);
        }
        Ok((f, node))
    }

    /// A fresh unbound socket of the given kind.
    pub fn socket(&self, kind: SocketKind, flags: OpenFlags) -> Result<i32> {
        let data = match kind {
            SocketKind::Stream => DataItem::StreamSocket(StreamSocket::new()),
            SocketKind::Datagram => DataItem::DatagramSocket(DatagramSocket::new()),
            SocketKind::SeqPacket => DataItem::SeqPacketSocket(SeqPacketSocket::new()),
        };
        let node = Inode::new(Mode::SOCKET | Mode::GRANTS, data);
        let fl = OpenFlags::READ | OpenFlags::WRITE | (flags & OpenFlags::NONBLOCK);
        self.install(Arc::new(Mutex::new(FileDescriptor::new(node, fl))), 0)
    }

    /// A pair of already-connected sockets. Stream and seqpacket only.
    pub fn socketpair(&self, kind: SocketKind, flags: OpenFlags) -> Result<(i32, i32)> {
        let (a, b) = match kind {
            SocketKind::Stream => {
                let a = Inode::new(
                    Mode::SOCKET | Mode::GRANTS,
                    DataItem::StreamSocket(StreamSocket::new()),
                );
                let b = Inode::new(
                    Mode::SOCKET | Mode::GRANTS,
                    DataItem::StreamSocket(StreamSocket::accepted(a.clone())),
                );
                (a, b)
            }
            SocketKind::SeqPacket => {
                let a = Inode::new(
                    Mode::SOCKET | Mode::GRANTS,
                    DataItem::SeqPacketSocket(SeqPacketSocket::new()),
                );
                let b = Inode::new(
                    Mode::SOCKET | Mode::GRANTS,
                    DataItem::SeqPacketSocket(SeqPacketSocket::accepted(a.clone())),
                );
                (a, b)
            }
            SocketKind::Datagram => return Err(Error::NotSupported),
        };
        if let Some((_, core)) = a.data().reliable_mut() {
            core.peer_handle = Some(b.clone());
            core.ready = true;
        }
        let fl = OpenFlags::READ | OpenFlags::WRITE | (flags & OpenFlags::NONBLOCK);
        let first = self.install(Arc::new(Mutex::new(FileDescriptor::new(b, fl))), 0)?;
        let second = self.install(Arc::new(Mutex::new(FileDescriptor::new(a, fl))), 0)?;
        Ok((first, second))
    }

    /// Give a socket a filesystem name.
    pub fn bind(&self, fd: i32, address: SocketAddress) -> Result<()> {
        let (_, node) = self.socket_descriptor(fd)?;
        {
            let mut data = node.data();
            let base = data.socket_base_mut().ok_or(Error::NotASocket)?;
            if base.address.is_valid() {
                return Err(Error::InvalidArgument);
            }
        }
        let (dir_node, file_name) = self.dir_of(CURRENT_DIRECTORY, address.value())?;
        match &mut *dir_node.data() {
            DataItem::Directory(d) => {
                if d.find(&file_name).is_some() {
                    return Err(Error::AddressInUse);
                }
                d.create(file_name, node.clone())?;
            }
            _ => return Err(Error::NotADirectory),
        }
        debug!(address = %address.value(), "bound socket");
        node.data().socket_base_mut().ok_or(Error::NotASocket)?.address = address;
        Ok(())
    }

    /// The filesystem node a socket address names. It must be a socket
    /// and writable.
    fn resolve_address(&self, address: &SocketAddress) -> Result<Node> {
        let item = self
            .resolve_at(CURRENT_DIRECTORY, address.value(), true)?
            .ok_or(Error::NotFound)?;
        if !item.mode().is_socket() {
            return Err(Error::ConnectionRefused);
        }
        self.check_grants(&item, Mode::WUSER)?;
        Ok(item)
    }

    /// Connect toward a bound socket. For reliable kinds this queues the
    /// caller in the listener's backlog; for datagram sockets it records
    /// the default recipient.
    pub fn connect(&self, fd: i32, address: &SocketAddress) -> Result<()> {
        let (_, node) = self.socket_descriptor(fd)?;
        let model = self.resolve_address(address)?;
        let flavor = node.data().socket_flavor().ok_or(Error::NotASocket)?;
        match flavor {
            SocketFlavor::Datagram => {
                if let DataItem::DatagramSocket(s) = &mut *node.data() {
                    s.default_recipient = Arc::downgrade(&model);
                }
                Ok(())
            }
            SocketFlavor::Stream | SocketFlavor::SeqPacket => {
                self.reliable_connect(&node, &model, flavor)
            }
        }
    }

    fn reliable_connect(&self, node: &Node, model: &Node, flavor: SocketFlavor) -> Result<()> {
        {
            let mut data = node.data();
            let (_, core) = data.reliable_mut().ok_or(Error::NotASocket)?;
            if core.ready || core.peer_handle.is_some() {
                return Err(Error::AlreadyConnected);
            }
        }
        {
            let mut md = model.data();
            if md.socket_flavor() != Some(flavor) {
                return Err(Error::WrongProtocolType);
            }
            let (base, core) = md.reliable_mut().ok_or(Error::WrongProtocolType)?;
            if base.closed || !core.can_connect() {
                return Err(Error::ConnectionRefused);
            }
            core.add_backlog(node.clone())?;
        }
        if let Some((_, core)) = node.data().reliable_mut() {
            core.peer_handle = Some(model.clone());
        }
        Ok(())
    }

    /// Mark a reliable socket passive with the given backlog limit.
    pub fn listen(&self, fd: i32, backlog: usize) -> Result<()> {
        let (_, node) = self.socket_descriptor(fd)?;
        let mut data = node.data();
        match data.reliable_mut() {
            Some((_, core)) => {
                core.listen(backlog);
                Ok(())
            }
            None => Err(Error::NotSupported),
        }
    }

    /// Take one pending connection, blocking while the backlog is empty.
    /// Returns the new descriptor and the peer's address.
    pub fn accept(&self, fd: i32) -> Result<(i32, SocketAddress)> {
        let (_, node) = self.socket_descriptor(fd)?;
        let partner = loop {
            {
                let mut data = node.data();
                let (_, core) = data.reliable_mut().ok_or(Error::NotSupported)?;
                if !core.passive {
                    return Err(Error::InvalidArgument);
                }
                if let Some(p) = core.pop_backlog() {
                    break p;
                }
            }
            self.sched.interrupt();
        };
        let address = fd::socket_address_of(&partner);
        let server_data = match partner.data().socket_flavor() {
            Some(SocketFlavor::Stream) => {
                DataItem::StreamSocket(StreamSocket::accepted(partner.clone()))
            }
            Some(SocketFlavor::SeqPacket) => {
                DataItem::SeqPacketSocket(SeqPacketSocket::accepted(partner.clone()))
            }
            _ => return Err(Error::NotSupported),
        };
        let server = Inode::new(Mode::SOCKET | Mode::GRANTS, server_data);
        if let Some((_, core)) = partner.data().reliable_mut() {
            core.peer_handle = Some(server.clone());
            core.ready = true;
        }
        let newfd = self.install(
            Arc::new(Mutex::new(FileDescriptor::new(
                server,
                OpenFlags::READ | OpenFlags::WRITE,
            ))),
            0,
        )?;
        Ok((newfd, address))
    }

    /// Send on a connected socket.
    pub fn send(&self, fd: i32, buf: &[u8], flags: MsgFlags) -> Result<usize> {
        let (f, node) = self.socket_descriptor(fd)?;
        let flags = f.lock().message_flags(flags);
        fd::socket_send(&node, &*self.sched, buf, flags)
    }

    /// Send toward an explicit address (datagram) or the connected peer.
    pub fn send_to(
        &self,
        fd: i32,
        buf: &[u8],
        flags: MsgFlags,
        address: Option<&SocketAddress>,
    ) -> Result<usize> {
        match address {
            None => self.send(fd, buf, flags),
            Some(addr) => {
                let (f, node) = self.socket_descriptor(fd)?;
                let flags = f.lock().message_flags(flags);
                let target = self.resolve_address(addr)?;
                fd::socket_send_to(&node, &*self.sched, buf, flags, &target)
            }
        }
    }

    /// Receive bytes or one packet, plus the sender's address.
    pub fn receive(
        &self,
        fd: i32,
        buf: &mut [u8],
        flags: MsgFlags,
    ) -> Result<(usize, SocketAddress)> {
        let (f, node) = self.socket_descriptor(fd)?;
        let flags = f.lock().message_flags(flags);
        fd::socket_receive(&node, &*self.sched, buf, flags)
    }

    /// The socket's own address (`getsockname`).
    pub fn socket_name(&self, fd: i32) -> Result<SocketAddress> {
        let (_, node) = self.socket_descriptor(fd)?;
        Ok(fd::socket_address_of(&node))
    }

    /// The connected peer's address (`getpeername`).
    ///
    /// A datagram socket counts as connected only when its default
    /// recipient points back at it.
    pub fn peer_name(&self, fd: i32) -> Result<SocketAddress> {
        let (_, node) = self.socket_descriptor(fd)?;
        let flavor = node.data().socket_flavor().ok_or(Error::NotASocket)?;
        let peer = match flavor {
            SocketFlavor::Datagram => {
                let recipient = match &*node.data() {
                    DataItem::DatagramSocket(s) => {
                        s.default_recipient.upgrade().ok_or(Error::NotConnected)?
                    }
                    _ => return Err(Error::NotASocket),
                };
                let back = match &*recipient.data() {
                    DataItem::DatagramSocket(t) => t.default_recipient.upgrade(),
                    _ => None,
                };
                match back {
                    Some(b) if Arc::ptr_eq(&b, &node) => recipient,
                    _ => return Err(Error::NotConnected),
                }
            }
            SocketFlavor::Stream | SocketFlavor::SeqPacket => {
                let mut data = node.data();
                let (_, core) = data.reliable_mut().ok_or(Error::NotASocket)?;
                core.peer()?.clone()
            }
        };
        Ok(fd::socket_address_of(&peer))
    }

    // --- memory mappings ---

    /// Create a mapping over `fd` (or anonymous memory) and return its
    /// opaque address. Shared file mappings write-lock the file.
    pub fn mmap(&self, fd: i32, length: usize, offset: usize, flags: MapFlags) -> Result<MapAddr> {
        if length == 0 {
            return Err(Error::InvalidArgument);
        }
        let addr = {
            let mut maps = self.maps.lock();
            let a = MapAddr(maps.next_addr);
            maps.next_addr += 0x1000;
            a
        };
        let mapping = if flags.contains(MapFlags::ANON) {
            Mapping::anonymous(addr, length)
        } else {
            let node = self.descriptor(fd)?.lock().node().clone();
            if flags.contains(MapFlags::PRIVATE) {
                Mapping::private(addr, length, &node, offset)?
            } else {
                Mapping::shared(addr, length, node, offset)?
            }
        };
        debug!(addr = addr.0, length, "mapped");
        self.maps.lock().maps.push(mapping);
        Ok(addr)
    }

    /// Release a mapping; a shared mapping's write lock goes with it.
    pub fn munmap(&self, addr: MapAddr) -> Result<()> {
        let removed = {
            let mut maps = self.maps.lock();
            let idx = maps
                .maps
                .iter()
                .position(|m| m.addr() == addr)
                .ok_or(Error::BadDescriptor)?;
            maps.maps.remove(idx)
        };
        drop(removed);
        Ok(())
    }

    /// Read bytes out of a live mapping.
    pub fn map_read(&self, addr: MapAddr, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let maps = self.maps.lock();
        let mapping = maps
            .maps
            .iter()
            .find(|m| m.addr() == addr)
            .ok_or(Error::BadDescriptor)?;
        Ok(mapping.read(offset, buf))
    }

    /// Write bytes through a live mapping. Shared mappings mutate the
    /// underlying file in place.
    pub fn map_write(&self, addr: MapAddr, offset: usize, buf: &[u8]) -> Result<usize> {
        let mut maps = self.maps.lock();
        let mapping = maps
            .maps
            .iter_mut()
            .find(|m| m.addr() == addr)
            .ok_or(Error::BadDescriptor)?;
        mapping.write(offset, buf)
    }

    /// Length of a live mapping.
    pub fn map_len(&self, addr: MapAddr) -> Result<usize> {
        let maps = self.maps.lock();
        maps.maps
            .iter()
            .find(|m| m.addr() == addr)
            .map(Mapping::len)
            .ok_or(Error::BadDescriptor)
    }

    // --- snapshot loading ---

    fn load_entry(&self, entry: &SnapshotEntry) -> Result<()> {
        let perm = entry.mode & Mode::CHMOD_MASK;
        match entry.kind {
            EntryKind::File => self
                .create_node(
                    CURRENT_DIRECTORY,
                    entry.path,
                    perm | Mode::FILE.bits(),
                    NodeInit::FileSnapshot(entry.content),
                )
                .map(|_| ()),
            EntryKind::Directory => {
                self.create_node_at(CURRENT_DIRECTORY, entry.path, perm | Mode::DIRECTORY.bits())
            }
            EntryKind::Pipe => {
                self.create_node_at(CURRENT_DIRECTORY, entry.path, perm | Mode::FIFO.bits())
            }
            EntryKind::Socket => {
                self.create_node_at(CURRENT_DIRECTORY, entry.path, perm | Mode::SOCKET.bits())
            }
            EntryKind::SymLink => {
                let target = std::str::from_utf8(entry.content)
                    .map_err(|_| Error::InvalidArgument)?;
                self.create_symlink_at(CURRENT_DIRECTORY, entry.path, target)
            }
        }
    }
}

/// Configures and builds a [`Vfs`].
///
/// ```
/// use vfskit::{SnapshotEntry, Vfs};
///
/// let vfs = Vfs::builder()
///     .snapshot(&[
///         SnapshotEntry::directory("etc", 0o755),
///         SnapshotEntry::file("etc/motd", 0o644, b"welcome\n"),
///     ])
///     .stdin(b"typed input".to_vec())
///     .build();
/// assert!(vfs.stat("/etc/motd").is_ok());
/// ```
pub struct VfsBuilder {
    snapshot: Vec<SnapshotEntry>,
    stdin: Vec<u8>,
    umask: u32,
    sched: Arc<dyn Scheduler>,
}

impl Default for VfsBuilder {
    fn default() -> Self {
        Self {
            snapshot: Vec::new(),
            stdin: Vec::new(),
            umask: (Mode::WGROUP | Mode::WOTHER).bits(),
            sched: Arc::new(YieldScheduler),
        }
    }
}

impl VfsBuilder {
    /// Seed the tree from a serialised image (parents before children).
    pub fn snapshot(mut self, entries: &[SnapshotEntry]) -> Self {
        self.snapshot.extend_from_slice(entries);
        self
    }

    /// Provide the standard-input byte image.
    pub fn stdin(mut self, content: Vec<u8>) -> Self {
        self.stdin = content;
        self
    }

    /// Initial umask (permission bits only).
    pub fn umask(mut self, mask: u32) -> Self {
        self.umask = mask & Mode::GRANTS.bits();
        self
    }

    /// Install a custom scheduler hook.
    pub fn scheduler(mut self, sched: Arc<dyn Scheduler>) -> Self {
        self.sched = sched;
        self
    }

    /// Build the filesystem: root, standard IO on descriptors 0-2, then
    /// the snapshot replayed through the normal creation path. A snapshot
    /// that cannot be replayed is a defect, not an error.
    pub fn build(self) -> Vfs {
        let root = Inode::new_directory(Mode::DIRECTORY | Mode::GRANTS, None);
        let stdin_node = Inode::new(
            Mode::FILE | Mode::RUSER,
            DataItem::StandardInput(StandardInput::new(self.stdin)),
        );
        let out_node = Inode::new(Mode::FILE | Mode::WUSER, DataItem::WriteOnly(WriteOnlyFile));

        let fds: Vec<Option<Fd>> = vec![
            Some(Arc::new(Mutex::new(FileDescriptor::new(
                stdin_node,
                OpenFlags::READ,
            )))),
            Some(Arc::new(Mutex::new(FileDescriptor::new(
                out_node.clone(),
                OpenFlags::WRITE,
            )))),
            Some(Arc::new(Mutex::new(FileDescriptor::new(
                out_node,
                OpenFlags::WRITE,
            )))),
        ];

        let vfs = Vfs {
            cwd: Mutex::new(Arc::downgrade(&root)),
            root,
            fds: Mutex::new(fds),
            dirs: Mutex::new(DirTable::default()),
            maps: Mutex::new(MapTable::default()),
            umask: Mutex::new(Mode::from_raw(self.umask)),
            sched: self.sched,
        };
        for entry in &self.snapshot {
            if let Err(err) = vfs.load_entry(entry) {
                vfs.sched.problem(&format!(
                    "snapshot entry {:?} cannot be created: {err}",
                    entry.path
                ));
            }
        }
        vfs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_create_write_read() {
        let vfs = Vfs::new();
        let fd = vfs
            .open_file_at(
                CURRENT_DIRECTORY,
                "a",
                OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
                0o644,
            )
            .unwrap();
        assert_eq!(fd, 3);
        assert_eq!(vfs.write(fd, b"hello").unwrap(), 5);
        assert_eq!(vfs.seek(fd, 0, Seek::Set).unwrap(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(vfs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn excl_create_refuses_existing() {
        let vfs = Vfs::new();
        vfs.open_file_at(CURRENT_DIRECTORY, "a", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .unwrap();
        assert_eq!(
            vfs.open_file_at(
                CURRENT_DIRECTORY,
                "a",
                OpenFlags::CREATE | OpenFlags::EXCL | OpenFlags::WRITE,
                0o644
            ),
            Err(Error::Exists)
        );
    }

    #[test]
    fn umask_masks_created_modes() {
        let vfs = Vfs::new();
        assert_eq!(vfs.set_umask(0o077), 0o022);
        vfs.create_node_at(CURRENT_DIRECTORY, "f", Mode::FILE.bits() | 0o666)
            .unwrap();
        let st = vfs.stat("f").unwrap();
        assert_eq!(st.mode.bits() & 0o777, 0o600);
    }

    #[test]
    fn mkdir_gets_setgid() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "d", Mode::DIRECTORY.bits() | 0o755)
            .unwrap();
        let st = vfs.stat("d").unwrap();
        assert!(st.mode.is_directory());
        assert!(st.mode.contains(Mode::SET_GID));
    }

    #[test]
    fn dup_shares_offset_and_inode() {
        let vfs = Vfs::new();
        let fd = vfs
            .open_file_at(
                CURRENT_DIRECTORY,
                "a",
                OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
                0o644,
            )
            .unwrap();
        vfs.write(fd, b"abc").unwrap();
        let dup = vfs.duplicate(fd).unwrap();
        assert_eq!(vfs.fstat(fd).unwrap().ino, vfs.fstat(dup).unwrap().ino);
        // One open file description: writes through either advance the
        // shared offset.
        vfs.write(dup, b"def").unwrap();
        assert_eq!(vfs.seek(fd, 0, Seek::Current).unwrap(), 6);
    }

    #[test]
    fn dup2_same_descriptor_is_identity() {
        let vfs = Vfs::new();
        assert_eq!(vfs.duplicate2(77, 77).unwrap(), 77);
        assert_eq!(vfs.descriptor(77).err(), Some(Error::BadDescriptor));
    }

    #[test]
    fn dup_from_respects_low_edge() {
        let vfs = Vfs::new();
        let fd = vfs
            .open_file_at(CURRENT_DIRECTORY, "a", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .unwrap();
        let dup = vfs.duplicate_from(fd, 10).unwrap();
        assert_eq!(dup, 10);
    }

    #[test]
    fn unresolvable_paths_error() {
        let vfs = Vfs::new();
        assert_eq!(vfs.stat("missing/child"), Err(Error::NotFound));
        vfs.create_node_at(CURRENT_DIRECTORY, "f", Mode::FILE.bits() | 0o644)
            .unwrap();
        assert_eq!(vfs.stat("f/child"), Err(Error::NotADirectory));
    }

    #[test]
    fn long_names_rejected() {
        let vfs = Vfs::new();
        let long_component = "x".repeat(FILE_NAME_LIMIT + 1);
        assert_eq!(vfs.stat(&long_component), Err(Error::NameTooLong));
        let long_path = "a/".repeat(PATH_LIMIT);
        assert_eq!(vfs.stat(&long_path), Err(Error::NameTooLong));
    }

    #[test]
    fn chmod_touches_permission_bits_only() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "f", Mode::FILE.bits() | 0o644)
            .unwrap();
        vfs.chmod("f", 0o400).unwrap();
        let st = vfs.stat("f").unwrap();
        assert!(st.mode.is_file());
        assert_eq!(st.mode.bits() & Mode::CHMOD_MASK, 0o400);
    }

    #[test]
    fn change_directory_moves_relative_resolution() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "d", Mode::DIRECTORY.bits() | 0o755)
            .unwrap();
        vfs.create_node_at(CURRENT_DIRECTORY, "d/inner", Mode::FILE.bits() | 0o644)
            .unwrap();
        vfs.change_directory("d").unwrap();
        assert!(vfs.stat("inner").is_ok());
        vfs.change_directory("..").unwrap();
        assert!(vfs.stat("d/inner").is_ok());
    }

    #[test]
    fn snapshot_populates_tree_with_cow_files() {
        let vfs = Vfs::builder()
            .snapshot(&[
                SnapshotEntry::directory("etc", 0o755),
                SnapshotEntry::file("etc/motd", 0o644, b"welcome\n"),
                SnapshotEntry::symlink("motd", "etc/motd"),
            ])
            .build();
        let fd = vfs
            .open_file_at(CURRENT_DIRECTORY, "motd", OpenFlags::READ, 0)
            .unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(vfs.read(fd, &mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], b"welcome\n");
    }

    #[test]
    fn stdin_descriptor_serves_image() {
        let vfs = Vfs::builder().stdin(b"typed".to_vec()).build();
        let mut buf = [0u8; 8];
        assert_eq!(vfs.read(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"typed");
        // Exhausted image reads as end of file.
        assert_eq!(vfs.read(0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn stdout_accepts_and_discards() {
        let vfs = Vfs::new();
        assert_eq!(vfs.write(1, b"log").unwrap(), 3);
        assert_eq!(vfs.write(2, b"err").unwrap(), 3);
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(1, &mut buf), Err(Error::BadDescriptor));
    }

    #[test]
    fn directory_iterator_lists_in_order() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "d", Mode::DIRECTORY.bits() | 0o755)
            .unwrap();
        vfs.create_node_at(CURRENT_DIRECTORY, "d/b", Mode::FILE.bits() | 0o644)
            .unwrap();
        vfs.create_node_at(CURRENT_DIRECTORY, "d/a", Mode::FILE.bits() | 0o644)
            .unwrap();
        let fd = vfs.open_file_at(CURRENT_DIRECTORY, "d", OpenFlags::READ, 0).unwrap();
        let handle = vfs.open_directory(fd).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = vfs.directory_get(handle).unwrap() {
            names.push(entry.name);
            vfs.directory_next(handle).unwrap();
        }
        assert_eq!(names, [".", "..", "a", "b"]);
        vfs.directory_rewind(handle).unwrap();
        assert_eq!(vfs.directory_tell(handle).unwrap(), 0);
        vfs.close_directory(handle).unwrap();
        assert_eq!(vfs.directory_get(handle).err(), Some(Error::BadDescriptor));
    }

    #[test]
    fn open_directory_for_write_fails() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "d", Mode::DIRECTORY.bits() | 0o755)
            .unwrap();
        assert_eq!(
            vfs.open_file_at(CURRENT_DIRECTORY, "d", OpenFlags::WRITE, 0),
            Err(Error::IsADirectory)
        );
    }

    #[test]
    fn append_writes_at_end() {
        let vfs = Vfs::new();
        let fd = vfs
            .open_file_at(
                CURRENT_DIRECTORY,
                "log",
                OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::APPEND,
                0o644,
            )
            .unwrap();
        vfs.write(fd, b"one").unwrap();
        vfs.seek(fd, 0, Seek::Set).unwrap();
        vfs.write(fd, b"two").unwrap();
        let st = vfs.stat("log").unwrap();
        assert_eq!(st.size, 6);
    }

    #[test]
    fn positional_write_ignores_append() {
        let vfs = Vfs::new();
        let fd = vfs
            .open_file_at(
                CURRENT_DIRECTORY,
                "log",
                OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE | OpenFlags::APPEND,
                0o644,
            )
            .unwrap();
        vfs.write(fd, b"abcdef").unwrap();
        assert_eq!(vfs.write_at(fd, 1, b"X").unwrap(), 1);
        let mut buf = [0u8; 6];
        assert_eq!(vfs.read_at(fd, 0, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"aXcdef");
    }

    #[test]
    fn set_flags_cannot_clear_append() {
        let vfs = Vfs::new();
        let fd = vfs
            .open_file_at(
                CURRENT_DIRECTORY,
                "log",
                OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::APPEND,
                0o644,
            )
            .unwrap();
        assert_eq!(
            vfs.set_descriptor_flags(fd, OpenFlags::empty()),
            Err(Error::NotPermitted)
        );
        vfs.set_descriptor_flags(fd, OpenFlags::APPEND | OpenFlags::NONBLOCK)
            .unwrap();
        assert!(vfs.descriptor_flags(fd).unwrap().contains(OpenFlags::NONBLOCK));
    }

    #[test]
    fn hard_link_shares_inode() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "f", Mode::FILE.bits() | 0o644)
            .unwrap();
        vfs.create_hard_link_at(
            CURRENT_DIRECTORY,
            "g",
            CURRENT_DIRECTORY,
            "f",
            AtFlags::empty(),
        )
        .unwrap();
        assert_eq!(vfs.stat("f").unwrap().ino, vfs.stat("g").unwrap().ino);
        // Directories cannot be hard linked.
        vfs.create_node_at(CURRENT_DIRECTORY, "d", Mode::DIRECTORY.bits() | 0o755)
            .unwrap();
        assert_eq!(
            vfs.create_hard_link_at(
                CURRENT_DIRECTORY,
                "d2",
                CURRENT_DIRECTORY,
                "d",
                AtFlags::empty()
            ),
            Err(Error::NotPermitted)
        );
    }

    #[test]
    fn mknod_device_kinds_refused() {
        let vfs = Vfs::new();
        assert_eq!(
            vfs.create_node_at(CURRENT_DIRECTORY, "c", Mode::CHAR_DEVICE.bits() | 0o644),
            Err(Error::NotPermitted)
        );
        assert_eq!(
            vfs.create_node_at(CURRENT_DIRECTORY, "b", Mode::BLOCK_DEVICE.bits() | 0o644),
            Err(Error::NotPermitted)
        );
    }

    #[test]
    fn access_checks_user_bits() {
        let vfs = Vfs::new();
        vfs.create_node_at(CURRENT_DIRECTORY, "f", Mode::FILE.bits() | 0o400)
            .unwrap();
        vfs.access_at(CURRENT_DIRECTORY, "f", AccessMode::READ, AtFlags::empty())
            .unwrap();
        assert_eq!(
            vfs.access_at(CURRENT_DIRECTORY, "f", AccessMode::WRITE, AtFlags::empty()),
            Err(Error::AccessDenied)
        );
    }
}
