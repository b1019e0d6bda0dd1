//! The shared inode object and its kind-tagged data item.
//!
//! Inodes are reference-counted: directory entries and open descriptors
//! hold strong references, while `..` entries and a datagram socket's
//! default recipient hold weak back-references to keep the graph acyclic.
//! The inode number is derived from object identity and is stable for the
//! inode's lifetime.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::dir::Directory;
use crate::file::{Link, RegularFile, StandardInput, WriteOnlyFile};
use crate::mode::Mode;
use crate::pipe::Pipe;
use crate::socket::{DatagramSocket, ReliableCore, SeqPacketSocket, SocketBase, StreamSocket};

/// Discriminates the three socket kinds without exposing their payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketFlavor {
    Stream,
    SeqPacket,
    Datagram,
}

pub(crate) type Node = Arc<Inode>;
pub(crate) type WeakNode = Weak<Inode>;

/// Kind-specific contents of an inode. The variant must agree with the
/// type nibble of the inode's mode word.
#[derive(Debug)]
pub(crate) enum DataItem {
    File(RegularFile),
    Link(Link),
    Directory(Directory),
    Fifo(Pipe),
    StreamSocket(StreamSocket),
    SeqPacketSocket(SeqPacketSocket),
    DatagramSocket(DatagramSocket),
    StandardInput(StandardInput),
    WriteOnly(WriteOnlyFile),
}

impl DataItem {
    /// Shared socket state, if this is a socket of any kind.
    pub(crate) fn socket_base(&self) -> Option<&SocketBase> {
        match self {
            DataItem::StreamSocket(s) => Some(&s.base),
            DataItem::SeqPacketSocket(s) => Some(&s.base),
            DataItem::DatagramSocket(s) => Some(&s.base),
            _ => None,
        }
    }

    pub(crate) fn socket_base_mut(&mut self) -> Option<&mut SocketBase> {
        match self {
            DataItem::StreamSocket(s) => Some(&mut s.base),
            DataItem::SeqPacketSocket(s) => Some(&mut s.base),
            DataItem::DatagramSocket(s) => Some(&mut s.base),
            _ => None,
        }
    }

    pub(crate) fn is_socket(&self) -> bool {
        self.socket_base().is_some()
    }

    pub(crate) fn socket_flavor(&self) -> Option<SocketFlavor> {
        match self {
            DataItem::StreamSocket(_) => Some(SocketFlavor::Stream),
            DataItem::SeqPacketSocket(_) => Some(SocketFlavor::SeqPacket),
            DataItem::DatagramSocket(_) => Some(SocketFlavor::Datagram),
            _ => None,
        }
    }

    /// The connection-oriented state, for stream and seqpacket sockets.
    pub(crate) fn reliable_mut(&mut self) -> Option<(&mut SocketBase, &mut ReliableCore)> {
        match self {
            DataItem::StreamSocket(s) => Some((&mut s.base, &mut s.core)),
            DataItem::SeqPacketSocket(s) => Some((&mut s.base, &mut s.core)),
            _ => None,
        }
    }

    /// Flip the closed flag and drop the peer linkage, if any.
    pub(crate) fn close_socket(&mut self) {
        match self {
            DataItem::StreamSocket(s) => s.close(),
            DataItem::SeqPacketSocket(s) => s.close(),
            DataItem::DatagramSocket(s) => s.close(),
            _ => {}
        }
    }
}

/// A filesystem entity independent of its names.
#[derive(Debug)]
pub(crate) struct Inode {
    mode: Mutex<Mode>,
    uid: u32,
    gid: u32,
    data: Mutex<DataItem>,
}

impl Inode {
    pub(crate) fn new(mode: Mode, data: DataItem) -> Node {
        Arc::new(Self {
            mode: Mutex::new(mode),
            uid: 0,
            gid: 0,
            data: Mutex::new(data),
        })
    }

    /// Directory inodes are cyclic: `.` names the inode itself. A missing
    /// parent makes the directory its own parent (the root).
    pub(crate) fn new_directory(mode: Mode, parent: Option<&Node>) -> Node {
        Arc::new_cyclic(|this: &WeakNode| {
            let parent = match parent {
                Some(p) => Arc::downgrade(p),
                None => this.clone(),
            };
            Self {
                mode: Mutex::new(mode),
                uid: 0,
                gid: 0,
                data: Mutex::new(DataItem::Directory(Directory::new(this.clone(), parent))),
            }
        })
    }

    pub(crate) fn mode(&self) -> Mode {
        *self.mode.lock()
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub(crate) fn uid(&self) -> u32 {
        self.uid
    }

    pub(crate) fn gid(&self) -> u32 {
        self.gid
    }

    pub(crate) fn data(&self) -> MutexGuard<'_, DataItem> {
        self.data.lock()
    }

    /// Size in bytes (entry count plus the two synthetic names for
    /// directories). Takes the data lock.
    pub(crate) fn size(&self) -> usize {
        match &*self.data.lock() {
            DataItem::File(f) => f.len(),
            DataItem::Link(l) => l.len(),
            DataItem::Directory(d) => d.len(),
            DataItem::Fifo(p) => p.len(),
            DataItem::StreamSocket(_)
            | DataItem::SeqPacketSocket(_)
            | DataItem::DatagramSocket(_) => 0,
            DataItem::StandardInput(s) => s.len(),
            DataItem::WriteOnly(_) => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn anonymous_stream_socket() -> Node {
        Inode::new(
            Mode::SOCKET | Mode::GRANTS,
            DataItem::StreamSocket(StreamSocket::new()),
        )
    }
}

/// The opaque inode number: derived from object identity.
pub(crate) fn ino(node: &Node) -> u64 {
    Arc::as_ptr(node) as usize as u64
}
