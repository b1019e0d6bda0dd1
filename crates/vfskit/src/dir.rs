//! Directory data item: an ordered name → inode map.
//!
//! The synthetic entries `.` and `..` are not stored in the map; they are
//! answered from the self and parent back-references. Every stored name is
//! non-empty, free of `/` and at most `FILE_NAME_LIMIT` bytes, and a child
//! directory's `..` always identifies its parent.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::inode::{DataItem, Node, WeakNode};
use crate::limits::FILE_NAME_LIMIT;

#[derive(Debug)]
pub(crate) struct Directory {
    entries: BTreeMap<String, Node>,
    this: WeakNode,
    parent: WeakNode,
}

impl Directory {
    pub(crate) fn new(this: WeakNode, parent: WeakNode) -> Self {
        Self {
            entries: BTreeMap::new(),
            this,
            parent,
        }
    }

    /// Entry count including the two synthetic names.
    pub(crate) fn len(&self) -> usize {
        self.entries.len() + 2
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn find(&self, name: &str) -> Option<Node> {
        match name {
            "." => self.this.upgrade(),
            ".." => self.parent.upgrade(),
            _ => self.entries.get(name).cloned(),
        }
    }

    /// Link `node` under `name`, fixing up the child's parent reference
    /// when it is a directory.
    pub(crate) fn create(&mut self, name: String, node: Node) -> Result<()> {
        validate_name(&name)?;
        if self.entries.contains_key(&name) {
            return Err(Error::Exists);
        }
        self.adopt(&node);
        self.entries.insert(name, node);
        Ok(())
    }

    /// Unlink a non-directory entry.
    pub(crate) fn remove(&mut self, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::IsADirectory);
        }
        let node = self.entries.get(name).ok_or(Error::NotFound)?;
        if node.mode().is_directory() {
            return Err(Error::IsADirectory);
        }
        self.entries.remove(name);
        Ok(())
    }

    /// Unlink an empty directory entry.
    pub(crate) fn remove_directory(&mut self, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument);
        }
        let node = self.entries.get(name).ok_or(Error::NotFound)?;
        if !node.mode().is_directory() {
            return Err(Error::NotADirectory);
        }
        if node.size() > 2 {
            return Err(Error::NotEmpty);
        }
        self.entries.remove(name);
        Ok(())
    }

    /// Install `node` under `name`, displacing whatever was there.
    pub(crate) fn replace_entry(&mut self, name: &str, node: Node) {
        self.adopt(&node);
        self.entries.insert(name.to_owned(), node);
    }

    /// Unlink `name` without any kind or emptiness checks.
    pub(crate) fn force_remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// Names and inodes in iteration order: `.`, `..`, then the map.
    pub(crate) fn list(&self) -> Vec<(String, Node)> {
        let mut out = Vec::with_capacity(self.entries.len() + 2);
        if let Some(this) = self.this.upgrade() {
            out.push((".".to_owned(), this));
        }
        if let Some(parent) = self.parent.upgrade() {
            out.push(("..".to_owned(), parent));
        }
        for (name, node) in &self.entries {
            out.push((name.clone(), node.clone()));
        }
        out
    }

    fn adopt(&mut self, node: &Node) {
        if node.mode().is_directory() {
            if let Some(this) = self.this.upgrade() {
                if Arc::ptr_eq(&this, node) {
                    return;
                }
                if let DataItem::Directory(child) = &mut *node.data() {
                    child.parent = Arc::downgrade(&this);
                }
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::InvalidArgument);
    }
    if name.len() > FILE_NAME_LIMIT {
        return Err(Error::NameTooLong);
    }
    Ok(())
}
