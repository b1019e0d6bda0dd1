//! File descriptors and kind-dispatched I/O.
//!
//! A descriptor couples an inode with open flags and a byte offset. `dup`
//! shares the descriptor object itself, so duplicated descriptors see one
//! offset. Blocking operations loop over a try-under-lock / release /
//! `interrupt` cycle: no inode lock is ever held across a suspension
//! point, so a cooperating thread can make the awaited condition true.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::flags::{MsgFlags, OpenFlags};
use crate::inode::{DataItem, Node, SocketFlavor};
use crate::sched::Scheduler;
use crate::socket::{DatagramSocket, Packet, SeqPacketSocket, SocketAddress, StreamSocket};

#[cfg(feature = "failpoints")]
use fail::fail_point;

/// Shared handle to an open descriptor; `dup` clones the `Arc`.
pub(crate) type Fd = Arc<Mutex<FileDescriptor>>;

#[derive(Debug)]
pub(crate) struct FileDescriptor {
    node: Node,
    flags: OpenFlags,
    offset: usize,
}

impl FileDescriptor {
    pub(crate) fn new(node: Node, flags: OpenFlags) -> Self {
        Self {
            node,
            flags,
            offset: 0,
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub(crate) fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: OpenFlags) {
        self.flags = flags;
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Size of the underlying inode, for `SEEK_END`.
    pub(crate) fn size(&self) -> usize {
        self.node.size()
    }

    /// Read at the current offset, advancing it for seekable items.
    pub(crate) fn read(&mut self, sched: &dyn Scheduler, buf: &mut [u8]) -> Result<usize> {
        #[cfg(feature = "failpoints")]
        fail_point!("fd::read", |action| {
            match action.as_deref() {
                Some("busy") => Err(Error::Busy),
                Some("denied") => Err(Error::AccessDenied),
                _ => Err(Error::WouldBlock),
            }
        });

        if !self.flags.contains(OpenFlags::READ) {
            return Err(Error::BadDescriptor);
        }
        loop {
            {
                let mut data = self.node.data();
                match &mut *data {
                    DataItem::File(f) => {
                        let n = f.read(self.offset, buf);
                        self.offset += n;
                        return Ok(n);
                    }
                    DataItem::Directory(_) => return Err(Error::IsADirectory),
                    DataItem::Link(_) | DataItem::WriteOnly(_) => {
                        return Err(Error::BadDescriptor)
                    }
                    DataItem::Fifo(p) => {
                        if buf.is_empty() {
                            return Ok(0);
                        }
                        let n = p.pop(buf);
                        if n > 0 {
                            return Ok(n);
                        }
                        if !p.writer() {
                            // Writer gone: end of file.
                            return Ok(0);
                        }
                        if self.flags.contains(OpenFlags::NONBLOCK) {
                            return Err(Error::WouldBlock);
                        }
                    }
                    DataItem::StandardInput(s) => {
                        if self.offset >= s.len() {
                            return Ok(0);
                        }
                        if s.can_read(sched) {
                            let n = s.read(self.offset, buf);
                            self.offset += n;
                            return Ok(n);
                        }
                        if self.flags.contains(OpenFlags::NONBLOCK) {
                            return Err(Error::WouldBlock);
                        }
                    }
                    DataItem::StreamSocket(_)
                    | DataItem::SeqPacketSocket(_)
                    | DataItem::DatagramSocket(_) => {
                        drop(data);
                        let flags = self.message_flags(MsgFlags::empty());
                        let (n, _) = socket_receive(&self.node, sched, buf, flags)?;
                        return Ok(n);
                    }
                }
            }
            sched.interrupt();
        }
    }

    /// Write at the current offset (or the end, under APPEND), advancing
    /// the offset for seekable items.
    pub(crate) fn write(&mut self, sched: &dyn Scheduler, buf: &[u8]) -> Result<usize> {
        #[cfg(feature = "failpoints")]
        fail_point!("fd::write", |action| {
            match action.as_deref() {
                Some("busy") => Err(Error::Busy),
                Some("denied") => Err(Error::AccessDenied),
                _ => Err(Error::WouldBlock),
            }
        });

        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(Error::BadDescriptor);
        }
        loop {
            {
                let mut data = self.node.data();
                match &mut *data {
                    DataItem::File(f) => {
                        if self.flags.contains(OpenFlags::APPEND) {
                            self.offset = f.len();
                        }
                        let n = f.write(self.offset, buf)?;
                        self.offset += n;
                        return Ok(n);
                    }
                    DataItem::Directory(_) => return Err(Error::IsADirectory),
                    DataItem::Link(_) | DataItem::StandardInput(_) => {
                        return Err(Error::BadDescriptor)
                    }
                    DataItem::WriteOnly(w) => return Ok(w.write(buf)),
                    DataItem::Fifo(p) => {
                        if !p.reader() {
                            return Err(Error::BrokenPipe);
                        }
                        if buf.is_empty() {
                            return Ok(0);
                        }
                        let n = p.push(buf);
                        if n > 0 {
                            return Ok(n);
                        }
                        if self.flags.contains(OpenFlags::NONBLOCK) {
                            return Err(Error::WouldBlock);
                        }
                    }
                    DataItem::StreamSocket(_)
                    | DataItem::SeqPacketSocket(_)
                    | DataItem::DatagramSocket(_) => {
                        drop(data);
                        let flags = self.message_flags(MsgFlags::empty());
                        return socket_send(&self.node, sched, buf, flags);
                    }
                }
            }
            sched.interrupt();
        }
    }

    /// Positional read. Defined for regular files only; never moves the
    /// descriptor offset.
    pub(crate) fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(Error::BadDescriptor);
        }
        match &*self.node.data() {
            DataItem::File(f) => Ok(f.read(offset, buf)),
            DataItem::Directory(_) => Err(Error::IsADirectory),
            _ => Err(Error::IllegalSeek),
        }
    }

    /// Positional write. Writes at `offset` even under APPEND.
    pub(crate) fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(Error::BadDescriptor);
        }
        match &mut *self.node.data() {
            DataItem::File(f) => f.write(offset, buf),
            DataItem::Directory(_) => Err(Error::IsADirectory),
            _ => Err(Error::IllegalSeek),
        }
    }

    /// Merge the descriptor's NONBLOCK into per-call message flags.
    pub(crate) fn message_flags(&self, flags: MsgFlags) -> MsgFlags {
        if self.flags.contains(OpenFlags::NONBLOCK) {
            flags | MsgFlags::DONT_WAIT
        } else {
            flags
        }
    }
}

impl Drop for FileDescriptor {
    fn drop(&mut self) {
        let mut data = self.node.data();
        match &mut *data {
            DataItem::Fifo(p) => {
                if self.flags.contains(OpenFlags::READ) {
                    p.release_reader();
                }
                if self.flags.contains(OpenFlags::WRITE) {
                    p.release_writer();
                }
            }
            other if other.is_socket() => other.close_socket(),
            _ => {}
        }
    }
}

// --- socket I/O ---
//
// These run at the node level so the descriptor lock need not be held by
// peers. Two inode locks are never held at once: peer handles are cloned
// out before the peer is locked.

fn as_stream(data: &mut DataItem) -> Result<&mut StreamSocket> {
    match data {
        DataItem::StreamSocket(s) => Ok(s),
        _ => Err(Error::WrongProtocolType),
    }
}

fn as_seq(data: &mut DataItem) -> Result<&mut SeqPacketSocket> {
    match data {
        DataItem::SeqPacketSocket(s) => Ok(s),
        _ => Err(Error::WrongProtocolType),
    }
}

fn as_dgram(data: &mut DataItem) -> Result<&mut DatagramSocket> {
    match data {
        DataItem::DatagramSocket(s) => Ok(s),
        _ => Err(Error::WrongProtocolType),
    }
}

/// Address a socket inode reports for itself.
pub(crate) fn socket_address_of(node: &Node) -> SocketAddress {
    node.data()
        .socket_base()
        .map(|b| b.address.clone())
        .unwrap_or_default()
}

fn socket_closed(node: &Node) -> bool {
    node.data().socket_base().map(|b| b.closed).unwrap_or(true)
}

fn socket_kind(node: &Node) -> Result<SocketFlavor> {
    node.data().socket_flavor().ok_or(Error::NotASocket)
}

/// Send on a connected socket (default recipient for datagrams).
pub(crate) fn socket_send(
    node: &Node,
    sched: &dyn Scheduler,
    buf: &[u8],
    flags: MsgFlags,
) -> Result<usize> {
    match socket_kind(node)? {
        SocketFlavor::Stream => stream_send(node, sched, buf, flags),
        SocketFlavor::SeqPacket => seq_send(node, buf, flags),
        SocketFlavor::Datagram => {
            let (from, target, closed) = {
                let data = node.data();
                match &*data {
                    DataItem::DatagramSocket(s) => (
                        s.base.address.clone(),
                        s.default_recipient.upgrade(),
                        s.base.closed,
                    ),
                    _ => return Err(Error::NotASocket),
                }
            };
            if closed {
                return Err(Error::BrokenPipe);
            }
            let target = target.ok_or(Error::DestinationRequired)?;
            dgram_deliver(&from, &target, buf)
        }
    }
}

/// Send toward an explicit target node; reliable sockets ignore it.
pub(crate) fn socket_send_to(
    node: &Node,
    sched: &dyn Scheduler,
    buf: &[u8],
    flags: MsgFlags,
    target: &Node,
) -> Result<usize> {
    match socket_kind(node)? {
        SocketFlavor::Stream => stream_send(node, sched, buf, flags),
        SocketFlavor::SeqPacket => seq_send(node, buf, flags),
        SocketFlavor::Datagram => {
            let (from, closed) = {
                let data = node.data();
                match &*data {
                    DataItem::DatagramSocket(s) => (s.base.address.clone(), s.base.closed),
                    _ => return Err(Error::NotASocket),
                }
            };
            if closed {
                return Err(Error::BrokenPipe);
            }
            dgram_deliver(&from, target, buf)
        }
    }
}

/// Receive one read's worth of data plus the sender's address.
pub(crate) fn socket_receive(
    node: &Node,
    sched: &dyn Scheduler,
    buf: &mut [u8],
    flags: MsgFlags,
) -> Result<(usize, SocketAddress)> {
    match socket_kind(node)? {
        SocketFlavor::Stream => stream_receive(node, sched, buf, flags),
        SocketFlavor::SeqPacket => seq_receive(node, sched, buf, flags),
        SocketFlavor::Datagram => dgram_receive(node, sched, buf, flags),
    }
}

fn stream_send(node: &Node, sched: &dyn Scheduler, buf: &[u8], flags: MsgFlags) -> Result<usize> {
    let peer = {
        let mut data = node.data();
        as_stream(&mut data)?.core.peer()?.clone()
    };
    if !peer.mode().user_write() {
        return Err(Error::AccessDenied);
    }
    if flags.contains(MsgFlags::DONT_WAIT) {
        let mut pd = peer.data();
        let ps = as_stream(&mut pd)?;
        if !ps.can_receive(buf.len()) {
            return Err(Error::WouldBlock);
        }
        if ps.base.closed {
            return Err(Error::ConnectionReset);
        }
        return Ok(ps.inbox.push(buf));
    }
    // Progress or deadlock: block until the peer accepts at least a byte.
    loop {
        {
            let mut pd = peer.data();
            let ps = as_stream(&mut pd)?;
            if ps.base.closed {
                return Err(Error::ConnectionReset);
            }
            let n = ps.inbox.push(buf);
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
        }
        sched.interrupt();
    }
}

fn seq_send(node: &Node, buf: &[u8], flags: MsgFlags) -> Result<usize> {
    let peer = {
        let mut data = node.data();
        as_seq(&mut data)?.core.peer()?.clone()
    };
    if !peer.mode().user_write() {
        return Err(Error::AccessDenied);
    }
    let mut pd = peer.data();
    let ps = as_seq(&mut pd)?;
    if flags.contains(MsgFlags::DONT_WAIT) && !ps.can_receive() {
        return Err(Error::WouldBlock);
    }
    if ps.base.closed {
        return Err(Error::ConnectionReset);
    }
    ps.inbox.push_back(Packet::new(buf));
    Ok(buf.len())
}

fn dgram_deliver(from: &SocketAddress, target: &Node, buf: &[u8]) -> Result<usize> {
    if !target.mode().user_write() {
        return Err(Error::AccessDenied);
    }
    let mut td = target.data();
    match &mut *td {
        DataItem::DatagramSocket(t) => {
            if t.base.closed {
                return Err(Error::ConnectionRefused);
            }
            t.inbox.push_back((from.clone(), Packet::new(buf)));
            Ok(buf.len())
        }
        DataItem::StreamSocket(_) | DataItem::SeqPacketSocket(_) => Err(Error::WrongProtocolType),
        _ => Err(Error::NotASocket),
    }
}

fn stream_receive(
    node: &Node,
    sched: &dyn Scheduler,
    buf: &mut [u8],
    flags: MsgFlags,
) -> Result<(usize, SocketAddress)> {
    loop {
        let mut data = node.data();
        let s = as_stream(&mut data)?;

        if s.inbox.is_empty() {
            if s.base.closed {
                return Ok((0, SocketAddress::unnamed()));
            }
            s.core.peer()?;
            if flags.contains(MsgFlags::DONT_WAIT) {
                return Err(Error::WouldBlock);
            }
            let peer = s.core.peer()?.clone();
            drop(data);
            if socket_closed(&peer) {
                // Peer hung up with nothing buffered: end of stream.
                return Ok((0, SocketAddress::unnamed()));
            }
            sched.interrupt();
            continue;
        }

        if flags.contains(MsgFlags::WAIT_ALL) && s.inbox.len() < buf.len() {
            if let Some(peer) = s.core.peer_handle.clone() {
                drop(data);
                if !socket_closed(&peer) {
                    sched.interrupt();
                    continue;
                }
                // Peer gone: hand over what is buffered.
                data = node.data();
            }
        }

        let s = as_stream(&mut data)?;
        let n = if flags.contains(MsgFlags::PEEK) {
            s.inbox.peek(buf)
        } else {
            s.inbox.pop(buf)
        };
        let peer = s.core.peer_handle.clone();
        drop(data);
        let addr = peer.map(|p| socket_address_of(&p)).unwrap_or_default();
        return Ok((n, addr));
    }
}

fn seq_receive(
    node: &Node,
    sched: &dyn Scheduler,
    buf: &mut [u8],
    flags: MsgFlags,
) -> Result<(usize, SocketAddress)> {
    loop {
        {
            let mut data = node.data();
            let s = as_seq(&mut data)?;
            if !s.inbox.is_empty() {
                let n = s.inbox.front().map(|p| p.read(buf)).unwrap_or(0);
                if !flags.contains(MsgFlags::PEEK) {
                    s.inbox.pop_front();
                }
                let peer = s.core.peer_handle.clone();
                drop(data);
                let addr = peer.map(|p| socket_address_of(&p)).unwrap_or_default();
                return Ok((n, addr));
            }
            if flags.contains(MsgFlags::DONT_WAIT) {
                return Err(Error::WouldBlock);
            }
            if s.base.closed {
                return Ok((0, SocketAddress::unnamed()));
            }
            let peer = s.core.peer()?.clone();
            drop(data);
            if socket_closed(&peer) {
                return Ok((0, SocketAddress::unnamed()));
            }
        }
        sched.interrupt();
    }
}

fn dgram_receive(
    node: &Node,
    sched: &dyn Scheduler,
    buf: &mut [u8],
    flags: MsgFlags,
) -> Result<(usize, SocketAddress)> {
    loop {
        {
            let mut data = node.data();
            let s = as_dgram(&mut data)?;
            if let Some((from, packet)) = s.inbox.front() {
                let n = packet.read(buf);
                let addr = from.clone();
                if !flags.contains(MsgFlags::PEEK) {
                    s.inbox.pop_front();
                }
                return Ok((n, addr));
            }
            if flags.contains(MsgFlags::DONT_WAIT) {
                return Err(Error::WouldBlock);
            }
        }
        sched.interrupt();
    }
}
