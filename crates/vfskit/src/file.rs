//! File-like data items: regular files, symlinks and the terminal pair.

use crate::error::{Error, Result};
use crate::limits::PATH_LIMIT;
use crate::sched::Scheduler;

/// Regular file contents.
///
/// A file constructed from snapshot bytes serves reads straight from the
/// snapshot until the first mutation copies it into the owned vector
/// (copy-on-write). Shared memory mappings hold a write lock on the file;
/// while any lock is held, writes fail with `EBUSY`.
#[derive(Debug, Default)]
pub struct RegularFile {
    snapshot: Option<&'static [u8]>,
    content: Vec<u8>,
    write_locks: u32,
}

impl RegularFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(bytes: &'static [u8]) -> Self {
        Self {
            snapshot: Some(bytes),
            content: Vec::new(),
            write_locks: 0,
        }
    }

    pub fn len(&self) -> usize {
        match self.snapshot {
            Some(bytes) => bytes.len(),
            None => self.content.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current bytes, snapshot-backed or owned.
    pub fn bytes(&self) -> &[u8] {
        match self.snapshot {
            Some(bytes) => bytes,
            None => &self.content,
        }
    }

    /// Read from `offset`, clamping to the remaining size. Offsets beyond
    /// the end produce zero bytes, not an error.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        let bytes = self.bytes();
        if offset >= bytes.len() {
            return 0;
        }
        let n = buf.len().min(bytes.len() - offset);
        buf[..n].copy_from_slice(&bytes[offset..offset + n]);
        n
    }

    /// Write at `offset`, extending the file with the written bytes if it
    /// ends short of `offset + buf.len()`.
    pub fn write(&mut self, offset: usize, buf: &[u8]) -> Result<usize> {
        if self.write_locks > 0 {
            return Err(Error::Busy);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.detach();
        if self.content.len() < offset + buf.len() {
            self.content.resize(offset + buf.len(), 0);
        }
        self.content[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    /// Truncate to zero length and drop the snapshot binding.
    pub fn clear(&mut self) {
        self.snapshot = None;
        self.content.clear();
    }

    /// Grow with zeros or shrink to `len` bytes.
    pub fn resize(&mut self, len: usize) {
        self.detach();
        self.content.resize(len, 0);
    }

    /// Copy snapshot bytes into owned storage; a no-op once detached.
    pub fn detach(&mut self) {
        if let Some(bytes) = self.snapshot.take() {
            self.content = bytes.to_vec();
        }
    }

    pub fn lock_write(&mut self) {
        self.write_locks += 1;
    }

    pub fn unlock_write(&mut self) {
        debug_assert!(self.write_locks > 0);
        self.write_locks = self.write_locks.saturating_sub(1);
    }

    pub fn write_locked(&self) -> bool {
        self.write_locks > 0
    }

    /// Overwrite bytes in place without the write-lock check. Used by
    /// shared mappings, which own the lock they would otherwise trip on.
    pub(crate) fn splice(&mut self, offset: usize, buf: &[u8]) {
        self.detach();
        if self.content.len() < offset + buf.len() {
            self.content.resize(offset + buf.len(), 0);
        }
        self.content[offset..offset + buf.len()].copy_from_slice(buf);
    }
}

/// Symbolic link target, immutable after creation.
#[derive(Debug)]
pub struct Link {
    target: String,
}

impl Link {
    pub fn new(target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        if target.len() > PATH_LIMIT {
            return Err(Error::NameTooLong);
        }
        Ok(Self { target })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Terminal-like sink backing standard output and standard error: accepts
/// and discards every write, refuses reads.
#[derive(Debug, Default)]
pub struct WriteOnlyFile;

impl WriteOnlyFile {
    pub fn write(&self, buf: &[u8]) -> usize {
        buf.len()
    }
}

/// Standard input backed by an optional byte image.
///
/// Readiness is nondeterministic: each poll asks the choice oracle whether
/// the modelled user has typed yet.
#[derive(Debug, Default)]
pub struct StandardInput {
    content: Vec<u8>,
}

impl StandardInput {
    pub fn new(content: Vec<u8>) -> Self {
        Self { content }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether a read would succeed right now. Models the user still
    /// drinking coffee: with content present, the oracle decides.
    pub fn can_read(&self, sched: &dyn Scheduler) -> bool {
        !self.content.is_empty() && sched.choose(2) == 0
    }

    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.content.len() {
            return 0;
        }
        let n = buf.len().min(self.content.len() - offset);
        buf[..n].copy_from_slice(&self.content[offset..offset + n]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::YieldScheduler;

    #[test]
    fn snapshot_reads_without_copying() {
        let f = RegularFile::from_snapshot(b"frozen");
        let mut buf = [0u8; 16];
        assert_eq!(f.read(0, &mut buf), 6);
        assert_eq!(&buf[..6], b"frozen");
        assert_eq!(f.len(), 6);
    }

    #[test]
    fn first_write_detaches_snapshot() {
        let mut f = RegularFile::from_snapshot(b"frozen");
        assert_eq!(f.write(0, b"FR").unwrap(), 2);
        let mut buf = [0u8; 16];
        assert_eq!(f.read(0, &mut buf), 6);
        assert_eq!(&buf[..6], b"FRozen");
    }

    #[test]
    fn read_past_end_yields_zero() {
        let f = RegularFile::from_snapshot(b"ab");
        let mut buf = [0u8; 4];
        assert_eq!(f.read(10, &mut buf), 0);
    }

    #[test]
    fn write_extends_with_zeros() {
        let mut f = RegularFile::new();
        f.write(4, b"xy").unwrap();
        assert_eq!(f.len(), 6);
        assert_eq!(f.bytes(), b"\0\0\0\0xy");
    }

    #[test]
    fn write_lock_makes_writes_busy() {
        let mut f = RegularFile::new();
        f.write(0, b"data").unwrap();
        f.lock_write();
        assert_eq!(f.write(0, b"x"), Err(Error::Busy));
        f.unlock_write();
        assert_eq!(f.write(0, b"x").unwrap(), 1);
    }

    #[test]
    fn clear_drops_snapshot_binding() {
        let mut f = RegularFile::from_snapshot(b"frozen");
        f.clear();
        assert_eq!(f.len(), 0);
        f.write(0, b"new").unwrap();
        assert_eq!(f.bytes(), b"new");
    }

    #[test]
    fn link_target_limit() {
        assert!(Link::new("x".repeat(PATH_LIMIT)).is_ok());
        assert_eq!(
            Link::new("x".repeat(PATH_LIMIT + 1)).unwrap_err(),
            Error::NameTooLong
        );
    }

    #[test]
    fn stdin_readiness_follows_oracle() {
        let sched = YieldScheduler;
        let empty = StandardInput::default();
        assert!(!empty.can_read(&sched));
        let full = StandardInput::new(b"hi".to_vec());
        // Default oracle always takes the goal branch.
        assert!(full.can_read(&sched));
    }
}
