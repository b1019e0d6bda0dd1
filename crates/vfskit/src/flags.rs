//! Flag words consumed by the operation surface.
//!
//! The out-of-scope C shim converts `O_*`, `MSG_*`, `AT_*` and `MAP_*`
//! bitmasks into these typed flags; the core never sees raw integers.

use bitflags::bitflags;

bitflags! {
    /// Open-time flags carried by every descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 1;
        const WRITE = 2;
        const CREATE = 4;
        const EXCL = 8;
        const TRUNCATE = 32;
        /// Check both read and write grants but open for neither.
        const NO_ACCESS = 64;
        const APPEND = 128;
        const SYM_NOFOLLOW = 256;
        const NONBLOCK = 512;
    }
}

bitflags! {
    /// Requested access kinds for `access`-style checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u32 {
        const EXECUTE = 1;
        const WRITE = 2;
        const READ = 4;
    }
}

bitflags! {
    /// `*at` operation modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtFlags: u32 {
        const REMOVE_DIR = 2;
        const EFFECTIVE_ID = 4;
        const SYM_FOLLOW = 8;
        const SYM_NOFOLLOW = 16;
    }
}

bitflags! {
    /// Per-call socket message flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgFlags: u32 {
        const DONT_WAIT = 1;
        const PEEK = 2;
        const WAIT_ALL = 4;
    }
}

bitflags! {
    /// Memory mapping kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const SHARED = 1;
        const PRIVATE = 2;
        const ANON = 4;
    }
}

/// Seek origin for [`crate::Vfs::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    Set,
    Current,
    End,
}

/// UNIX-domain socket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
    SeqPacket,
}
