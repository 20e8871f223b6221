//! Mapped executables and their wrapper registry.
//!
//! [`MappedImage`] pairs the byte buffer with a format layout and owns the
//! current wrapper set. Every mutation runs as a transaction: validate,
//! write, re-derive the layout from the new bytes, and roll the bytes back
//! if any step fails. The buffer is never handed out mutably, so a mutation
//! cannot skip the re-wrap.

use tracing::{debug, info, warn};

use crate::core::address::AddressKind;
use crate::core::buffer::ExeBuffer;
use crate::core::executable::{BitMode, Executable};
use crate::core::wrapper::{lookup, EntryTemplate, ListDiscipline, Node, Wrapper, WrapperPath};
use crate::error::{ExeError, Result};

/// An executable that supports all three address kinds and owns wrappers.
pub trait MappedExecutable: Executable {
    /// Current top-level wrapper set, in id order.
    fn wrappers(&self) -> &[Wrapper];

    fn wrapper(&self, id: usize) -> Option<&Wrapper> {
        self.wrappers().get(id)
    }

    fn wrappers_count(&self) -> usize {
        self.wrappers().len()
    }

    fn wrapper_by_name(&self, name: &str) -> Option<(usize, &Wrapper)> {
        self.wrappers()
            .iter()
            .enumerate()
            .find(|(_, w)| w.name() == name)
    }

    fn resolve(&self, path: &WrapperPath) -> Result<&Wrapper> {
        lookup(self.wrappers(), path)
    }

    /// Recompute the whole wrapper set from current content.
    fn wrap(&mut self) -> Result<()>;

    /// Overwrite every byte of the wrapper at `path` with `value`.
    fn fill_content(&mut self, path: &WrapperPath, value: u8) -> Result<()>;

    /// Append an entry to the node at `path`; returns the new entry's index.
    fn add_entry(&mut self, path: &WrapperPath, template: &EntryTemplate) -> Result<usize>;
}

/// The format-specific half of a mapped image: everything derived from bytes.
pub trait ImageLayout: Sized {
    /// Derive the layout and wrapper set from the current content.
    fn parse(buffer: &ExeBuffer) -> Result<Self>;

    fn bit_mode(&self) -> BitMode;

    fn entry_point(&self) -> u64;

    fn image_base(&self) -> u64;

    /// Size of the image once mapped (RVA and VA extent).
    fn virtual_size(&self) -> u64;

    fn alignment(&self, kind: AddressKind) -> u64;

    fn raw_to_rva(&self, raw: u64) -> Option<u64>;

    fn rva_to_raw(&self, rva: u64) -> Option<u64>;

    fn wrappers(&self) -> &[Wrapper];
}

/// Byte content plus the layout most recently derived from it.
#[derive(Debug, Clone)]
pub struct MappedImage<L> {
    buffer: ExeBuffer,
    layout: L,
}

impl<L: ImageLayout> MappedImage<L> {
    pub fn new(buffer: ExeBuffer) -> Result<Self> {
        let layout = L::parse(&buffer)?;
        info!(
            size = buffer.len(),
            wrappers = layout.wrappers().len(),
            "Mapped image"
        );
        Ok(Self { buffer, layout })
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn buffer(&self) -> &ExeBuffer {
        &self.buffer
    }

    /// Run `op` against the buffer, re-derive the layout, then `check` it.
    ///
    /// On any error the buffer is restored and the previous layout kept.
    fn transact<T, F, C>(&mut self, op: F, check: C) -> Result<T>
    where
        F: FnOnce(&mut ExeBuffer, &L) -> Result<T>,
        C: FnOnce(&L, &T) -> Result<()>,
    {
        let snapshot = self.buffer.clone();
        let outcome = op(&mut self.buffer, &self.layout).and_then(|out| {
            let layout =
                L::parse(&self.buffer).map_err(|e| ExeError::RewrapRejected(e.to_string()))?;
            check(&layout, &out)?;
            Ok((out, layout))
        });

        match outcome {
            Ok((out, layout)) => {
                self.layout = layout;
                debug!(wrappers = self.layout.wrappers().len(), "Re-wrapped after mutation");
                Ok(out)
            }
            Err(err) => {
                self.buffer = snapshot;
                warn!(error = %err, "Mutation rolled back");
                Err(err)
            }
        }
    }
}

fn count_limit(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (u32::from(width) * 8)) - 1
    }
}

/// Bytes for a new entry of `node`.
fn entry_bytes(buffer: &ExeBuffer, node: &Node, template: &EntryTemplate) -> Result<Vec<u8>> {
    let entry_size = node.entry_size();
    match template {
        EntryTemplate::Bytes(bytes) => {
            if bytes.len() as u64 != entry_size {
                return Err(ExeError::TemplateMismatch {
                    expected: entry_size,
                    actual: bytes.len() as u64,
                });
            }
            Ok(bytes.clone())
        }
        EntryTemplate::Minimal => match node.discipline() {
            ListDiscipline::Counted(_) => {
                let len = usize::try_from(entry_size).map_err(|_| ExeError::OutOfBounds {
                    offset: node.next_entry_offset(),
                    size: entry_size,
                    len: buffer.len() as u64,
                })?;
                Ok(vec![0u8; len])
            }
            // An all-zero row would read back as the terminator.
            ListDiscipline::NullTerminated => {
                let last = node.last_entry().ok_or(ExeError::NoTemplate)?;
                buffer
                    .read(last.offset(), entry_size)
                    .map(<[u8]>::to_vec)
                    .ok_or(ExeError::OutOfBounds {
                        offset: last.offset(),
                        size: entry_size,
                        len: buffer.len() as u64,
                    })
            }
        },
    }
}

impl<L: ImageLayout> Executable for MappedImage<L> {
    fn bit_mode(&self) -> BitMode {
        self.layout.bit_mode()
    }

    fn entry_point(&self) -> u64 {
        self.layout.entry_point()
    }

    fn image_base(&self) -> u64 {
        self.layout.image_base()
    }

    fn mapped_size(&self, kind: AddressKind) -> u64 {
        match kind {
            AddressKind::Raw => self.buffer.len() as u64,
            AddressKind::Rva | AddressKind::Va => self.layout.virtual_size(),
        }
    }

    fn alignment(&self, kind: AddressKind) -> u64 {
        self.layout.alignment(kind)
    }

    fn content(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    fn raw_to_rva(&self, raw: u64) -> Option<u64> {
        self.layout.raw_to_rva(raw)
    }

    fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        self.layout.rva_to_raw(rva)
    }

    fn as_mapped(&self) -> Option<&dyn MappedExecutable> {
        Some(self)
    }

    fn as_mapped_mut(&mut self) -> Option<&mut dyn MappedExecutable> {
        Some(self)
    }
}

impl<L: ImageLayout> MappedExecutable for MappedImage<L> {
    fn wrappers(&self) -> &[Wrapper] {
        self.layout.wrappers()
    }

    fn wrap(&mut self) -> Result<()> {
        self.layout = L::parse(&self.buffer)?;
        debug!(wrappers = self.layout.wrappers().len(), "Wrapped");
        Ok(())
    }

    fn fill_content(&mut self, path: &WrapperPath, value: u8) -> Result<()> {
        self.transact(
            |buffer, layout| {
                let wrapper = lookup(layout.wrappers(), path)?;
                buffer.fill(wrapper.offset(), wrapper.size(), value)
            },
            |_, _| Ok(()),
        )
    }

    fn add_entry(&mut self, path: &WrapperPath, template: &EntryTemplate) -> Result<usize> {
        self.transact(
            |buffer, layout| {
                let wrapper = lookup(layout.wrappers(), path)?;
                let node = wrapper.as_node().ok_or(ExeError::NotANode)?;
                if !node.can_add_entry() {
                    return Err(ExeError::CapacityExceeded {
                        used: node.used(),
                        entry_size: node.entry_size(),
                        capacity: node.capacity(),
                    });
                }
                let bytes = entry_bytes(buffer, node, template)?;
                let index = node.entries_count();

                match node.discipline() {
                    ListDiscipline::Counted(field) => {
                        let current = buffer.read_uint(field.offset, field.width).ok_or(
                            ExeError::OutOfBounds {
                                offset: field.offset,
                                size: u64::from(field.width),
                                len: buffer.len() as u64,
                            },
                        )?;
                        let next = current
                            .checked_add(field.step)
                            .filter(|&v| v <= count_limit(field.width))
                            .ok_or(ExeError::CountOverflow)?;
                        buffer.write(node.next_entry_offset(), &bytes)?;
                        buffer.write_uint(field.offset, field.width, next)?;
                    }
                    ListDiscipline::NullTerminated => {
                        buffer.write(node.next_entry_offset(), &bytes)?;
                    }
                }
                Ok(index)
            },
            |layout, &index| {
                let count = lookup(layout.wrappers(), path)
                    .ok()
                    .and_then(Wrapper::as_node)
                    .map(Node::entries_count);
                if count == Some(index + 1) {
                    Ok(())
                } else {
                    Err(ExeError::EntryNotRegistered)
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wrapper::CountField;

    /// Toy format: byte 0 is a row count, rows of 4 bytes start at 4, the
    /// table may grow until byte 32. A 0xFF byte at 1 makes parsing fail.
    #[derive(Debug)]
    struct Toy {
        wrappers: Vec<Wrapper>,
    }

    impl ImageLayout for Toy {
        fn parse(buffer: &ExeBuffer) -> Result<Self> {
            if buffer.read_uint(1, 1) == Some(0xFF) {
                return Err(ExeError::InvalidFormat("poisoned".into()));
            }
            let count = buffer.read_uint(0, 1).unwrap_or(0);
            let rows = (0..count)
                .map(|i| Wrapper::element(format!("row{}", i), 4 + i * 4, 4))
                .collect::<Vec<_>>();
            let used = count * 4;
            let capacity = used + buffer.zero_run(4 + used, 32);
            let node = Node::new(
                4,
                4,
                ListDiscipline::Counted(CountField {
                    offset: 0,
                    width: 1,
                    step: 1,
                }),
                capacity,
                rows,
            );
            Ok(Self {
                wrappers: vec![
                    Wrapper::element("header", 0, 4),
                    Wrapper::element("table", 4, used).with_node(node),
                    Wrapper::element("tail", 32, 8),
                ],
            })
        }
        fn bit_mode(&self) -> BitMode {
            BitMode::Bits32
        }
        fn entry_point(&self) -> u64 {
            0
        }
        fn image_base(&self) -> u64 {
            0x10000
        }
        fn virtual_size(&self) -> u64 {
            0x100
        }
        fn alignment(&self, _kind: AddressKind) -> u64 {
            1
        }
        fn raw_to_rva(&self, raw: u64) -> Option<u64> {
            Some(raw)
        }
        fn rva_to_raw(&self, rva: u64) -> Option<u64> {
            Some(rva)
        }
        fn wrappers(&self) -> &[Wrapper] {
            &self.wrappers
        }
    }

    fn toy(rows: u8, len: usize) -> MappedImage<Toy> {
        let mut data = vec![0u8; len];
        data[0] = rows;
        for i in 0..usize::from(rows) {
            data[4 + i * 4..8 + i * 4].copy_from_slice(&[0xAB; 4]);
        }
        MappedImage::new(ExeBuffer::new(&data)).unwrap()
    }

    fn table_count(image: &MappedImage<Toy>) -> usize {
        image.wrapper(1).and_then(Wrapper::as_node).unwrap().entries_count()
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let mut image = toy(2, 40);
        let before = image.wrappers().to_vec();
        image.wrap().unwrap();
        assert_eq!(image.wrappers(), &before[..]);
    }

    #[test]
    fn test_lookup_by_name() {
        let image = toy(1, 40);
        let (id, wrapper) = image.wrapper_by_name("table").unwrap();
        assert_eq!(id, 1);
        assert_eq!(wrapper.offset(), 4);
        assert!(image.wrapper_by_name("missing").is_none());
        assert!(image.wrapper(3).is_none());
    }

    #[test]
    fn test_add_entry_counted() {
        let mut image = toy(2, 40);
        let index = image
            .add_entry(&WrapperPath::top(1), &EntryTemplate::Minimal)
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(table_count(&image), 3);
        assert_eq!(image.content()[0], 3);
        assert_eq!(&image.content()[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_add_entry_with_bytes() {
        let mut image = toy(0, 40);
        image
            .add_entry(
                &WrapperPath::top(1),
                &EntryTemplate::Bytes(vec![1, 2, 3, 4]),
            )
            .unwrap();
        assert_eq!(&image.content()[4..8], &[1, 2, 3, 4]);

        let err = image
            .add_entry(&WrapperPath::top(1), &EntryTemplate::Bytes(vec![1, 2]))
            .unwrap_err();
        assert!(matches!(err, ExeError::TemplateMismatch { expected: 4, actual: 2 }));
        assert_eq!(table_count(&image), 1);
    }

    #[test]
    fn test_add_entry_full_table() {
        let mut image = toy(7, 40);
        let before = image.content().to_vec();
        let err = image
            .add_entry(&WrapperPath::top(1), &EntryTemplate::Minimal)
            .unwrap_err();
        assert!(matches!(err, ExeError::CapacityExceeded { .. }));
        assert_eq!(image.content(), &before[..]);
        assert_eq!(table_count(&image), 7);
    }

    #[test]
    fn test_add_entry_to_leaf() {
        let mut image = toy(1, 40);
        let err = image
            .add_entry(&WrapperPath::top(0), &EntryTemplate::Minimal)
            .unwrap_err();
        assert!(matches!(err, ExeError::NotANode));
    }

    #[test]
    fn test_fill_content() {
        let mut image = toy(2, 40);
        image.fill_content(&WrapperPath::top(1).child(1), 0x00).unwrap();
        assert_eq!(&image.content()[8..12], &[0, 0, 0, 0]);
        assert_eq!(&image.content()[4..8], &[0xAB; 4]);
    }

    #[test]
    fn test_fill_out_of_bounds_changes_nothing() {
        // "tail" spans 32..40 but the image is only 36 bytes long.
        let mut image = toy(1, 36);
        let before = image.content().to_vec();
        let err = image.fill_content(&WrapperPath::top(2), 0x11).unwrap_err();
        assert!(matches!(err, ExeError::OutOfBounds { .. }));
        assert_eq!(image.content(), &before[..]);
    }

    #[test]
    fn test_rejected_rewrap_rolls_back() {
        let mut image = toy(1, 40);
        let before = image.content().to_vec();
        let err = image.fill_content(&WrapperPath::top(0), 0xFF).unwrap_err();
        assert!(matches!(err, ExeError::RewrapRejected(_)));
        assert_eq!(image.content(), &before[..]);
        assert_eq!(image.wrappers_count(), 3);
    }

    #[test]
    fn test_unknown_wrapper() {
        let mut image = toy(1, 40);
        assert!(matches!(
            image.fill_content(&WrapperPath::top(9), 0),
            Err(ExeError::NoSuchWrapper(_))
        ));
    }

    #[test]
    fn test_count_limit() {
        assert_eq!(count_limit(1), 0xFF);
        assert_eq!(count_limit(2), 0xFFFF);
        assert_eq!(count_limit(8), u64::MAX);
    }
}
