//! Memory mappings over regular files.
//!
//! A mapping is either a private buffer (zero-filled for anonymous maps,
//! seeded from the file for private file maps) or a shared view anchored
//! in the regular file's byte vector. Shared views hold the file's write
//! lock for their whole lifetime, so plain writes fail with `EBUSY` until
//! the mapping is released. Handles are opaque addresses, unique per VFS.

use crate::error::{Error, Result};
use crate::inode::{DataItem, Node};

/// Opaque address of a live mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapAddr(pub(crate) usize);

#[derive(Debug)]
enum MappingKind {
    Private(Vec<u8>),
    Shared { file: Node, offset: usize },
}

#[derive(Debug)]
pub(crate) struct Mapping {
    addr: MapAddr,
    len: usize,
    kind: MappingKind,
}

impl Mapping {
    /// Anonymous mapping: a private zero-filled buffer.
    pub(crate) fn anonymous(addr: MapAddr, len: usize) -> Self {
        Self {
            addr,
            len,
            kind: MappingKind::Private(vec![0; len]),
        }
    }

    /// Private file mapping: a detached copy of the file's bytes at
    /// `offset`, zero-extended to `len`.
    pub(crate) fn private(addr: MapAddr, len: usize, file: &Node, offset: usize) -> Result<Self> {
        let mut buf = vec![0; len];
        match &*file.data() {
            DataItem::File(f) => {
                f.read(offset, &mut buf);
            }
            _ => return Err(Error::BadDescriptor),
        }
        Ok(Self {
            addr,
            len,
            kind: MappingKind::Private(buf),
        })
    }

    /// Shared file mapping: anchors the file region and takes the write
    /// lock. Snapshot-backed files are detached first so the view always
    /// covers owned bytes.
    pub(crate) fn shared(addr: MapAddr, len: usize, file: Node, offset: usize) -> Result<Self> {
        match &mut *file.data() {
            DataItem::File(f) => {
                f.detach();
                f.lock_write();
            }
            _ => return Err(Error::BadDescriptor),
        }
        Ok(Self {
            addr,
            len,
            kind: MappingKind::Shared { file, offset },
        })
    }

    pub(crate) fn addr(&self) -> MapAddr {
        self.addr
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Read mapped bytes at `offset` within the mapping.
    pub(crate) fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let want = buf.len().min(self.len - offset);
        match &self.kind {
            MappingKind::Private(bytes) => {
                buf[..want].copy_from_slice(&bytes[offset..offset + want]);
                want
            }
            MappingKind::Shared { file, offset: base } => match &*file.data() {
                DataItem::File(f) => f.read(base + offset, &mut buf[..want]),
                _ => 0,
            },
        }
    }

    /// Write through the mapping. Shared views mutate the file in place,
    /// bypassing the write lock the mapping itself holds.
    pub(crate) fn write(&mut self, offset: usize, buf: &[u8]) -> Result<usize> {
        if offset >= self.len {
            return Err(Error::InvalidArgument);
        }
        let n = buf.len().min(self.len - offset);
        match &mut self.kind {
            MappingKind::Private(bytes) => {
                bytes[offset..offset + n].copy_from_slice(&buf[..n]);
                Ok(n)
            }
            MappingKind::Shared { file, offset: base } => match &mut *file.data() {
                DataItem::File(f) => {
                    f.splice(*base + offset, &buf[..n]);
                    Ok(n)
                }
                _ => Err(Error::BadDescriptor),
            },
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if let MappingKind::Shared { file, .. } = &self.kind {
            if let DataItem::File(f) = &mut *file.data() {
                f.unlock_write();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::RegularFile;
    use crate::inode::Inode;
    use crate::mode::Mode;

    fn file_node(content: &[u8]) -> Node {
        let mut f = RegularFile::new();
        f.write(0, content).unwrap();
        Inode::new(Mode::FILE | Mode::RUSER | Mode::WUSER, DataItem::File(f))
    }

    #[test]
    fn anonymous_mapping_is_zero_filled() {
        let m = Mapping::anonymous(MapAddr(1), 8);
        let mut buf = [0xffu8; 8];
        assert_eq!(m.read(0, &mut buf), 8);
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn private_mapping_copies_and_detaches() {
        let node = file_node(b"hello");
        let mut m = Mapping::private(MapAddr(2), 5, &node, 0).unwrap();
        m.write(0, b"H").unwrap();
        let mut buf = [0u8; 5];
        m.read(0, &mut buf);
        assert_eq!(&buf, b"Hello");
        // The file itself is untouched.
        match &*node.data() {
            DataItem::File(f) => assert_eq!(f.bytes(), b"hello"),
            _ => unreachable!(),
        };
    }

    #[test]
    fn shared_mapping_locks_writes_until_drop() {
        let node = file_node(b"shared data here");
        let m = Mapping::shared(MapAddr(3), 6, node.clone(), 0).unwrap();
        match &mut *node.data() {
            DataItem::File(f) => assert_eq!(f.write(0, b"x"), Err(Error::Busy)),
            _ => unreachable!(),
        }
        drop(m);
        match &mut *node.data() {
            DataItem::File(f) => assert_eq!(f.write(0, b"x").unwrap(), 1),
            _ => unreachable!(),
        };
    }

    #[test]
    fn shared_mapping_writes_reach_the_file() {
        let node = file_node(b"abcdef");
        let mut m = Mapping::shared(MapAddr(4), 4, node.clone(), 2).unwrap();
        m.write(0, b"XY").unwrap();
        match &*node.data() {
            DataItem::File(f) => assert_eq!(f.bytes(), b"abXYef"),
            _ => unreachable!(),
        };
    }
}
