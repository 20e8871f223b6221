//! Data directory wrappers
//!
//! Each parser turns one optional data directory into a wrapper. A failure
//! here is not fatal to the image; the layout logs it and omits the wrapper.

pub mod debug;
pub mod export;
pub mod import;
pub mod tls;

pub use debug::wrap_debug;
pub use export::wrap_exports;
pub use import::wrap_imports;
pub use tls::wrap_tls;

use crate::core::buffer::ExeBuffer;
use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::{PeError, Result};
use crate::formats::pe::utils::cstring_at;

/// Longest name read from the image.
const MAX_NAME_LEN: usize = 256;

/// Read-only view of an image shared by the directory parsers.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    buffer: &'a ExeBuffer,
    sections: &'a SectionTable,
    is_64bit: bool,
}

impl<'a> ImageView<'a> {
    pub fn new(buffer: &'a ExeBuffer, sections: &'a SectionTable, is_64bit: bool) -> Self {
        Self {
            buffer,
            sections,
            is_64bit,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.buffer.as_slice()
    }

    pub fn len(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_64bit(&self) -> bool {
        self.is_64bit
    }

    /// Size of a pointer-sized field.
    pub fn word_size(&self) -> u64 {
        if self.is_64bit {
            8
        } else {
            4
        }
    }

    pub fn rva_to_raw(&self, rva: u64) -> Result<u64> {
        self.sections
            .rva_to_raw(rva)
            .filter(|&raw| raw < self.len())
            .ok_or(PeError::InvalidRva { rva })
    }

    /// Null-terminated string at an RVA, if it resolves.
    pub fn string_at_rva(&self, rva: u64) -> Option<String> {
        if rva == 0 {
            return None;
        }
        let raw = self.rva_to_raw(rva).ok()?;
        cstring_at(self.data(), raw, MAX_NAME_LEN).map(str::to_string)
    }

    /// `used` plus the run of zero bytes after it, within the region holding `table`.
    pub fn growth_capacity(&self, table: u64, used: u64) -> u64 {
        let limit = self
            .sections
            .region_end(table)
            .unwrap_or(self.len())
            .min(self.len());
        used.saturating_add(self.buffer.zero_run(table.saturating_add(used), limit))
    }

    /// True when the slot at `offset` is all zero (a list terminator).
    pub fn is_zero(&self, offset: u64, size: u64) -> Option<bool> {
        self.buffer
            .read(offset, size)
            .map(|slot| slot.iter().all(|&b| b == 0))
    }
}
