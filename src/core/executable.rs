//! The capability set every loaded image exposes.

use std::fmt;

use crate::core::address::AddressKind;
use crate::core::address_space;
use crate::core::buffer::ExeBuffer;
use crate::core::mapped::MappedExecutable;

/// Native word size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitMode {
    Bits32,
    Bits64,
}

impl BitMode {
    pub fn bits(self) -> u32 {
        match self {
            BitMode::Bits32 => 32,
            BitMode::Bits64 => 64,
        }
    }

    /// Size in bytes of a pointer-sized field.
    pub fn word_size(self) -> u64 {
        u64::from(self.bits() / 8)
    }
}

impl fmt::Display for BitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// An executable image as seen by the interactive layer.
///
/// Address conversion is provided in terms of the two layout hooks
/// [`Executable::raw_to_rva`] and [`Executable::rva_to_raw`]; formats only
/// implement the mapping, bounds and identity rules live in
/// [`address_space::convert`].
pub trait Executable {
    fn bit_mode(&self) -> BitMode;

    /// Entry point, expressed as an RVA.
    fn entry_point(&self) -> u64;

    /// Load base used for RVA <-> VA conversion.
    fn image_base(&self) -> u64;

    /// Total size of the image in the given coordinate system.
    fn mapped_size(&self, kind: AddressKind) -> u64;

    /// Alignment granularity in the given coordinate system.
    fn alignment(&self, kind: AddressKind) -> u64;

    /// Current bytes of the on-disk image.
    fn content(&self) -> &[u8];

    /// Layout mapping from a file offset to an RVA.
    fn raw_to_rva(&self, _raw: u64) -> Option<u64> {
        None
    }

    /// Layout mapping from an RVA to a file offset.
    fn rva_to_raw(&self, _rva: u64) -> Option<u64> {
        None
    }

    /// The mapped view of this image, when it has one.
    fn as_mapped(&self) -> Option<&dyn MappedExecutable> {
        None
    }

    fn as_mapped_mut(&mut self) -> Option<&mut dyn MappedExecutable> {
        None
    }

    fn is_mapped(&self) -> bool {
        self.as_mapped().is_some()
    }

    /// Convert `addr` between coordinate systems; `None` when it has no representation.
    fn convert_addr(&self, addr: u64, from: AddressKind, to: AddressKind) -> Option<u64> {
        address_space::convert(self, addr, from, to)
    }

    /// Up to `len` bytes starting at `addr`, clipped to the end of the image.
    fn content_at(&self, addr: u64, kind: AddressKind, len: u64) -> Option<&[u8]> {
        let raw = self.convert_addr(addr, kind, AddressKind::Raw)?;
        let content = self.content();
        let start = usize::try_from(raw).ok()?;
        if start >= content.len() {
            return None;
        }
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        let end = start.saturating_add(len).min(content.len());
        Some(&content[start..end])
    }
}

/// An image loaded without any format knowledge: only RAW offsets have meaning.
#[derive(Debug, Clone)]
pub struct RawExecutable {
    buffer: ExeBuffer,
    bit_mode: BitMode,
}

impl RawExecutable {
    pub fn new(buffer: ExeBuffer) -> Self {
        Self::with_bit_mode(buffer, BitMode::Bits32)
    }

    pub fn with_bit_mode(buffer: ExeBuffer, bit_mode: BitMode) -> Self {
        Self { buffer, bit_mode }
    }

    pub fn buffer(&self) -> &ExeBuffer {
        &self.buffer
    }
}

impl Executable for RawExecutable {
    fn bit_mode(&self) -> BitMode {
        self.bit_mode
    }

    fn entry_point(&self) -> u64 {
        0
    }

    fn image_base(&self) -> u64 {
        0
    }

    fn mapped_size(&self, kind: AddressKind) -> u64 {
        match kind {
            AddressKind::Raw => self.buffer.len() as u64,
            AddressKind::Rva | AddressKind::Va => 0,
        }
    }

    fn alignment(&self, kind: AddressKind) -> u64 {
        match kind {
            AddressKind::Raw => 1,
            AddressKind::Rva | AddressKind::Va => 0,
        }
    }

    fn content(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}
