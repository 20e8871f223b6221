//! Owned, mutable byte storage for a loaded image.

use bytes::BytesMut;

use crate::error::{ExeError, Result};

/// Byte content of an executable image.
///
/// Reads are public; writes are crate-private so that every mutation goes
/// through a transaction that re-derives the wrapper set afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExeBuffer {
    bytes: BytesMut,
}

impl ExeBuffer {
    pub fn new(data: &[u8]) -> Self {
        Self {
            bytes: BytesMut::from(data),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// Byte range `[offset, offset + size)` as slice indices, if it lies inside the buffer.
    fn span(&self, offset: u64, size: u64) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let len = usize::try_from(size).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    /// True when `[offset, offset + size)` lies entirely inside the buffer.
    pub fn contains(&self, offset: u64, size: u64) -> bool {
        self.span(offset, size).is_some()
    }

    pub fn read(&self, offset: u64, size: u64) -> Option<&[u8]> {
        self.span(offset, size).map(|r| &self.bytes[r])
    }

    /// Read a little-endian unsigned integer of `width` bytes (1..=8).
    pub fn read_uint(&self, offset: u64, width: u8) -> Option<u64> {
        if width == 0 || width > 8 {
            return None;
        }
        let bytes = self.read(offset, u64::from(width))?;
        let mut out = [0u8; 8];
        out[..bytes.len()].copy_from_slice(bytes);
        Some(u64::from_le_bytes(out))
    }

    fn out_of_bounds(&self, offset: u64, size: u64) -> ExeError {
        ExeError::OutOfBounds {
            offset,
            size,
            len: self.bytes.len() as u64,
        }
    }

    /// Overwrite a whole range with `value`; nothing is written when the range is out of bounds.
    pub(crate) fn fill(&mut self, offset: u64, size: u64, value: u8) -> Result<()> {
        let range = self
            .span(offset, size)
            .ok_or_else(|| self.out_of_bounds(offset, size))?;
        self.bytes[range].fill(value);
        Ok(())
    }

    pub(crate) fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let size = data.len() as u64;
        let range = self
            .span(offset, size)
            .ok_or_else(|| self.out_of_bounds(offset, size))?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn write_uint(&mut self, offset: u64, width: u8, value: u64) -> Result<()> {
        if width == 0 || width > 8 {
            return Err(self.out_of_bounds(offset, u64::from(width)));
        }
        let bytes = value.to_le_bytes();
        self.write(offset, &bytes[..usize::from(width)])
    }

    /// Length of the run of zero bytes starting at `offset`, not looking past `limit`.
    pub fn zero_run(&self, offset: u64, limit: u64) -> u64 {
        let limit = limit.min(self.bytes.len() as u64);
        if offset >= limit {
            return 0;
        }
        // Both bounds are within the buffer here.
        let slice = &self.bytes[offset as usize..limit as usize];
        slice.iter().take_while(|&&b| b == 0).count() as u64
    }
}
