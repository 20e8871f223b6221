//! Address types for executable images.
//!
//! Executable formats use three coordinate systems for the same byte: its
//! offset in the on-disk image, its offset from the load base once mapped,
//! and its absolute address in memory. `AddressKind` tags which one a
//! magnitude is expressed in.

use std::fmt;

/// Sentinel magnitude meaning "not representable".
///
/// It is never a valid input or output of a conversion; APIs in this crate
/// return `None` instead of this value.
pub const INVALID_ADDR: u64 = u64::MAX;

/// The kind of address representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressKind {
    /// Byte offset within the on-disk image
    Raw,
    /// Relative Virtual Address (offset from the load base)
    Rva,
    /// Virtual Address (load base + RVA)
    Va,
}

impl AddressKind {
    /// All kinds, in conversion-table order.
    pub const ALL: [AddressKind; 3] = [AddressKind::Raw, AddressKind::Rva, AddressKind::Va];

    /// One-letter code used in compact output and command selectors.
    pub fn to_char(self) -> char {
        match self {
            AddressKind::Raw => 'r',
            AddressKind::Rva => 'v',
            AddressKind::Va => 'V',
        }
    }

    /// Short label used in conversion headers.
    pub fn label(self) -> &'static str {
        match self {
            AddressKind::Raw => "raw",
            AddressKind::Rva => "RVA",
            AddressKind::Va => "VA",
        }
    }

    /// True for the kinds that only exist once the image is mapped.
    pub fn is_virtual(self) -> bool {
        !matches!(self, AddressKind::Raw)
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
