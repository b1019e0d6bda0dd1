//! vfskit: an in-process POSIX-style virtual filesystem.
//!
//! The crate models files, directories, pipes, symbolic links and
//! UNIX-domain sockets entirely in memory, for use inside a model checker
//! or sandboxed interpreter: client code drives a POSIX-shaped surface
//! (open, read, write, mkdir, pipe, socket, connect, accept, mmap, …),
//! and every operation that would block in a real kernel instead yields
//! through a host-supplied [`Scheduler`] hook, turning blocking into
//! explicit cooperative reschedule points.
//!
//! # Example
//!
//! ```rust
//! use vfskit::{OpenFlags, Seek, Vfs, CURRENT_DIRECTORY};
//!
//! fn main() -> vfskit::Result<()> {
//!     let vfs = Vfs::new();
//!     let fd = vfs.open_file_at(
//!         CURRENT_DIRECTORY,
//!         "greeting",
//!         OpenFlags::CREATE | OpenFlags::READ | OpenFlags::WRITE,
//!         0o644,
//!     )?;
//!     vfs.write(fd, b"hello")?;
//!     vfs.seek(fd, 0, Seek::Set)?;
//!     let mut buf = [0u8; 8];
//!     let n = vfs.read(fd, &mut buf)?;
//!     assert_eq!(&buf[..n], b"hello");
//!     vfs.close_file(fd)
//! }
//! ```
//!
//! # Blocking and threads
//!
//! The default [`YieldScheduler`] maps suspension points onto
//! `std::thread::yield_now`, so a `Vfs` shared between OS threads behaves
//! like a tiny kernel: a reader blocked on an empty pipe spins in the
//! scheduler hook until a writer thread delivers bytes. Model checkers
//! substitute their own hook and drive the interleaving themselves.

mod dir;
mod error;
mod fd;
mod file;
mod flags;
mod inode;
mod limits;
mod mmap;
mod mode;
mod path;
mod pipe;
mod sched;
mod snapshot;
mod socket;
mod stream;
mod vfs;

pub use error::{Error, Result};
pub use flags::{AccessMode, AtFlags, MapFlags, MsgFlags, OpenFlags, Seek, SocketKind};
pub use limits::{
    CURRENT_DIRECTORY, FILE_DESCRIPTOR_LIMIT, FILE_NAME_LIMIT, PATH_LIMIT, PIPE_SIZE_LIMIT,
    SOCKET_STREAM_LIMIT,
};
pub use mmap::MapAddr;
pub use mode::Mode;
pub use sched::{Scheduler, YieldScheduler};
pub use snapshot::{EntryKind, SnapshotEntry};
pub use socket::SocketAddress;
pub use vfs::{DirEntry, DirHandle, Stat, Vfs, VfsBuilder};
