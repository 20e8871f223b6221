//! Wrapper tree: named, bounded regions of an image.
//!
//! A [`Wrapper`] describes one region (a header, a table, a table row) by
//! its RAW offset and size. A wrapper that owns an ordered list of child
//! wrappers carries a [`Node`]; callers reach it through
//! [`Wrapper::as_node`] instead of probing types at runtime.
//!
//! Wrappers are plain values produced by a re-wrap and borrowed from the
//! executable that produced them. Any mutation of the executable needs a
//! mutable borrow, so a wrapper cannot be held across the re-wrap that
//! supersedes it.

use std::fmt;

use crate::error::{ExeError, Result};

/// A named scalar field inside a wrapper, addressed by absolute RAW offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: u64,
    pub width: u8,
}

impl Field {
    pub fn new(name: &'static str, offset: u64, width: u8) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }
}

/// Build a field list from a `(name, relative offset, width)` table.
pub fn fields_at(base: u64, table: &[(&'static str, u64, u8)]) -> Vec<Field> {
    table
        .iter()
        .map(|&(name, rel, width)| Field::new(name, base.saturating_add(rel), width))
        .collect()
}

/// One identifiable region of an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapper {
    name: String,
    offset: u64,
    size: u64,
    fields: Vec<Field>,
    node: Option<Node>,
}

impl Wrapper {
    /// A leaf region with no children.
    pub fn element(name: impl Into<String>, offset: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            fields: Vec::new(),
            node: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// RAW offset of the first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// RAW offset one past the last byte, if it does not overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Child-tree view, present only for wrappers that hold entries.
    pub fn as_node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn is_node(&self) -> bool {
        self.node.is_some()
    }
}

/// Size field that tracks the length of a counted list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountField {
    /// RAW offset of the field
    pub offset: u64,
    /// Width in bytes
    pub width: u8,
    /// Amount the field grows by per entry (1 for counts, entry size for byte sizes)
    pub step: u64,
}

/// How the length of an entry list is recorded in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDiscipline {
    /// The list ends with an all-zero entry that occupies one slot.
    NullTerminated,
    /// A header field holds the length.
    Counted(CountField),
}

/// The ordered, capacity-bounded child list of a wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    table_offset: u64,
    entry_size: u64,
    discipline: ListDiscipline,
    capacity: u64,
    entries: Vec<Wrapper>,
}

impl Node {
    /// Create a node; `capacity` is raised to the extent already in use.
    pub fn new(
        table_offset: u64,
        entry_size: u64,
        discipline: ListDiscipline,
        capacity: u64,
        entries: Vec<Wrapper>,
    ) -> Self {
        let mut node = Self {
            table_offset,
            entry_size,
            discipline,
            capacity,
            entries,
        };
        node.capacity = node.capacity.max(node.used());
        node
    }

    /// RAW offset of the first entry slot.
    pub fn table_offset(&self) -> u64 {
        self.table_offset
    }

    pub fn entry_size(&self) -> u64 {
        self.entry_size
    }

    pub fn discipline(&self) -> ListDiscipline {
        self.discipline
    }

    /// Bytes available to the list, starting at `table_offset`.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn entries(&self) -> &[Wrapper] {
        &self.entries
    }

    pub fn entries_count(&self) -> usize {
        self.entries.len()
    }

    /// Child at `index`; never fabricated past the current count.
    pub fn entry_at(&self, index: usize) -> Option<&Wrapper> {
        self.entries.get(index)
    }

    pub fn last_entry(&self) -> Option<&Wrapper> {
        self.entries.last()
    }

    fn slots(&self) -> u64 {
        let count = self.entries.len() as u64;
        match self.discipline {
            ListDiscipline::NullTerminated => count.saturating_add(1),
            ListDiscipline::Counted(_) => count,
        }
    }

    /// Bytes occupied by the entries, including a terminator slot.
    pub fn used(&self) -> u64 {
        self.slots().saturating_mul(self.entry_size)
    }

    /// RAW offset where the next entry would be written.
    pub fn next_entry_offset(&self) -> u64 {
        let count = self.entries.len() as u64;
        self.table_offset
            .saturating_add(count.saturating_mul(self.entry_size))
    }

    /// True iff one more entry fits in the capacity.
    pub fn can_add_entry(&self) -> bool {
        self.entry_size > 0
            && self
                .used()
                .checked_add(self.entry_size)
                .is_some_and(|needed| needed <= self.capacity)
    }
}

/// Initial content for an entry appended with `add_entry`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntryTemplate {
    /// Structurally minimal entry for the list's discipline.
    #[default]
    Minimal,
    /// Exact bytes; the length must equal the node's entry size.
    Bytes(Vec<u8>),
}

/// Location of a wrapper: a top-level id followed by child indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WrapperPath {
    pub id: usize,
    pub entries: Vec<usize>,
}

impl WrapperPath {
    pub fn top(id: usize) -> Self {
        Self {
            id,
            entries: Vec::new(),
        }
    }

    /// Path of the `index`-th child of this wrapper.
    pub fn child(&self, index: usize) -> Self {
        let mut entries = self.entries.clone();
        entries.push(index);
        Self { id: self.id, entries }
    }
}

impl fmt::Display for WrapperPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        for index in &self.entries {
            write!(f, "/{}", index)?;
        }
        Ok(())
    }
}

/// Resolve `path` inside a wrapper set, reporting which step failed.
pub fn lookup<'a>(wrappers: &'a [Wrapper], path: &WrapperPath) -> Result<&'a Wrapper> {
    let mut current = wrappers
        .get(path.id)
        .ok_or_else(|| ExeError::NoSuchWrapper(path.to_string()))?;
    for &index in &path.entries {
        let node = current.as_node().ok_or(ExeError::NotANode)?;
        current = node.entry_at(index).ok_or(ExeError::NoSuchEntry {
            index,
            count: node.entries_count(),
        })?;
    }
    Ok(current)
}
