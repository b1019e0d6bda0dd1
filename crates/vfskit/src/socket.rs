//! UNIX-domain socket data items.
//!
//! Three kinds share an address and a closed flag: stream and seqpacket
//! sockets are connection-oriented and embed a common reliable core (peer
//! handle, passive flag, listen limit, backlog); datagram sockets are
//! connectionless with an addressed packet inbox. Blocking behaviour lives
//! in the manager, which releases inode locks between suspension-loop
//! iterations; the types here only expose non-blocking state transitions.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::inode::{Node, WeakNode};
use crate::limits::SOCKET_STREAM_LIMIT;
use crate::stream::Stream;

/// Address of a UNIX-domain socket.
///
/// Sockets never bound to a path carry an anonymous, invalid address;
/// `bind` installs the filesystem path of the socket's inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAddress {
    value: String,
    anonymous: bool,
    valid: bool,
}

impl Default for SocketAddress {
    fn default() -> Self {
        Self::unnamed()
    }
}

impl SocketAddress {
    /// The address of a socket that was never bound.
    pub fn unnamed() -> Self {
        Self {
            value: String::new(),
            anonymous: true,
            valid: false,
        }
    }

    /// A filesystem address.
    pub fn path(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            anonymous: false,
            valid: true,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// One message on a seqpacket or datagram socket. Boundaries are
/// preserved; a short read truncates and discards the remainder.
#[derive(Debug)]
pub(crate) struct Packet {
    data: Vec<u8>,
}

impl Packet {
    pub(crate) fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        n
    }
}

/// State common to every socket kind.
#[derive(Debug, Default)]
pub(crate) struct SocketBase {
    pub(crate) address: SocketAddress,
    pub(crate) closed: bool,
}

/// Connection state shared by stream and seqpacket sockets.
#[derive(Debug, Default)]
pub(crate) struct ReliableCore {
    /// Strong handle keeping the other endpoint alive. While connecting it
    /// names the passive listener; once the connection completes it names
    /// the true peer.
    pub(crate) peer_handle: Option<Node>,
    /// Connection completed: the handle names the peer and I/O may flow.
    pub(crate) ready: bool,
    pub(crate) passive: bool,
    pub(crate) limit: usize,
    pub(crate) backlog: VecDeque<Node>,
}

impl ReliableCore {
    fn accepted(partner: Node) -> Self {
        Self {
            peer_handle: Some(partner),
            ready: true,
            ..Self::default()
        }
    }

    pub(crate) fn listen(&mut self, limit: usize) {
        self.passive = true;
        self.limit = limit;
    }

    pub(crate) fn can_connect(&self) -> bool {
        self.passive
    }

    /// Queue an inbound connection, refusing above the listen limit.
    pub(crate) fn add_backlog(&mut self, incoming: Node) -> Result<()> {
        if self.backlog.len() == self.limit {
            return Err(Error::ConnectionRefused);
        }
        self.backlog.push_back(incoming);
        Ok(())
    }

    pub(crate) fn pop_backlog(&mut self) -> Option<Node> {
        self.backlog.pop_front()
    }

    /// The connected peer, if the handshake has completed.
    pub(crate) fn peer(&self) -> Result<&Node> {
        match &self.peer_handle {
            Some(node) if self.ready => Ok(node),
            _ => Err(Error::NotConnected),
        }
    }

    fn abort(&mut self) {
        self.peer_handle = None;
        self.ready = false;
    }
}

/// Connection-oriented byte stream.
#[derive(Debug)]
pub(crate) struct StreamSocket {
    pub(crate) base: SocketBase,
    pub(crate) core: ReliableCore,
    pub(crate) inbox: Stream,
}

impl Default for StreamSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSocket {
    pub(crate) fn new() -> Self {
        Self {
            base: SocketBase::default(),
            core: ReliableCore::default(),
            inbox: Stream::new(SOCKET_STREAM_LIMIT),
        }
    }

    /// Server-side endpoint wrapping a partner popped from the backlog.
    pub(crate) fn accepted(partner: Node) -> Self {
        Self {
            base: SocketBase::default(),
            core: ReliableCore::accepted(partner),
            inbox: Stream::new(SOCKET_STREAM_LIMIT),
        }
    }

    /// Whether `amount` more bytes fit in the inbox.
    pub(crate) fn can_receive(&self, amount: usize) -> bool {
        self.inbox.len() + amount <= self.inbox.capacity()
    }

    pub(crate) fn close(&mut self) {
        self.base.closed = true;
        self.core.abort();
    }
}

/// Connection-oriented message socket: boundaries preserved, order kept.
#[derive(Debug, Default)]
pub(crate) struct SeqPacketSocket {
    pub(crate) base: SocketBase,
    pub(crate) core: ReliableCore,
    pub(crate) inbox: VecDeque<Packet>,
}

impl SeqPacketSocket {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn accepted(partner: Node) -> Self {
        Self {
            base: SocketBase::default(),
            core: ReliableCore::accepted(partner),
            inbox: VecDeque::new(),
        }
    }

    /// The packet inbox is unbounded; only a closed socket refuses input.
    pub(crate) fn can_receive(&self) -> bool {
        !self.base.closed
    }

    pub(crate) fn close(&mut self) {
        self.base.closed = true;
        self.core.abort();
    }
}

/// Connectionless message socket with per-packet sender addresses.
#[derive(Debug, Default)]
pub(crate) struct DatagramSocket {
    pub(crate) base: SocketBase,
    pub(crate) inbox: VecDeque<(SocketAddress, Packet)>,
    /// Default send target installed by `connect`; weak so a forgotten
    /// peer does not keep the inode alive.
    pub(crate) default_recipient: WeakNode,
}

impl DatagramSocket {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn can_receive(&self) -> bool {
        !self.base.closed
    }

    pub(crate) fn close(&mut self) {
        self.base.closed = true;
    }
}
