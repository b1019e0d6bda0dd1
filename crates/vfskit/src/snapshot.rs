//! Serialised filesystem images.
//!
//! A snapshot is a flat list of records emitted by the out-of-scope
//! generator tool, one per node, in pre-order (parents before children).
//! File contents stay borrowed (`&'static`) and back the regular files
//! copy-on-write; the loader in [`crate::VfsBuilder`] replays every record
//! through the same node-creation path the syscalls use.

/// Kind tag of a snapshot record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Pipe,
    Socket,
    SymLink,
}

/// One node of the initial filesystem image.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotEntry {
    /// Path relative to the root, `/`-separated.
    pub path: &'static str,
    pub kind: EntryKind,
    /// Permission bits; the type nibble is supplied by `kind`.
    pub mode: u32,
    /// File contents, or the link target for symlinks. Ignored otherwise.
    pub content: &'static [u8],
}

impl SnapshotEntry {
    pub const fn file(path: &'static str, mode: u32, content: &'static [u8]) -> Self {
        Self {
            path,
            kind: EntryKind::File,
            mode,
            content,
        }
    }

    pub const fn directory(path: &'static str, mode: u32) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
            mode,
            content: &[],
        }
    }

    pub const fn pipe(path: &'static str, mode: u32) -> Self {
        Self {
            path,
            kind: EntryKind::Pipe,
            mode,
            content: &[],
        }
    }

    pub const fn socket(path: &'static str, mode: u32) -> Self {
        Self {
            path,
            kind: EntryKind::Socket,
            mode,
            content: &[],
        }
    }

    pub const fn symlink(path: &'static str, target: &'static str) -> Self {
        Self {
            path,
            kind: EntryKind::SymLink,
            mode: 0o777,
            content: target.as_bytes(),
        }
    }
}
