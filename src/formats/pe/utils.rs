//! Utility functions for PE parsing

use crate::formats::pe::types::{PeError, Result};

/// Extension trait for reading primitive types from byte slices
pub trait ReadExt {
    fn read_u16_le_at(&self, offset: usize) -> Option<u16>;
    fn read_u32_le_at(&self, offset: usize) -> Option<u32>;
    fn read_u64_le_at(&self, offset: usize) -> Option<u64>;
    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<&str>;
}

impl ReadExt for [u8] {
    #[inline(always)]
    fn read_u16_le_at(&self, offset: usize) -> Option<u16> {
        self.get(offset..offset.checked_add(2)?)
            .and_then(|b| b.try_into().ok())
            .map(u16::from_le_bytes)
    }

    #[inline(always)]
    fn read_u32_le_at(&self, offset: usize) -> Option<u32> {
        self.get(offset..offset.checked_add(4)?)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    }

    #[inline(always)]
    fn read_u64_le_at(&self, offset: usize) -> Option<u64> {
        self.get(offset..offset.checked_add(8)?)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes)
    }

    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<&str> {
        let end = offset.saturating_add(max_len).min(self.len());
        let slice = self.get(offset..end)?;

        // Find null terminator
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        std::str::from_utf8(&slice[..len]).ok()
    }
}

fn index(offset: u64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| PeError::InvalidOffset { offset })
}

pub fn u16_at(data: &[u8], offset: u64) -> Result<u16> {
    data.read_u16_le_at(index(offset)?)
        .ok_or(PeError::InvalidOffset { offset })
}

pub fn u32_at(data: &[u8], offset: u64) -> Result<u32> {
    data.read_u32_le_at(index(offset)?)
        .ok_or(PeError::InvalidOffset { offset })
}

pub fn u64_at(data: &[u8], offset: u64) -> Result<u64> {
    data.read_u64_le_at(index(offset)?)
        .ok_or(PeError::InvalidOffset { offset })
}

/// Read a pointer-sized value.
pub fn word_at(data: &[u8], offset: u64, is_64bit: bool) -> Result<u64> {
    if is_64bit {
        u64_at(data, offset)
    } else {
        u32_at(data, offset).map(u64::from)
    }
}

/// Read a null-terminated string, returning `None` for unreadable or non-UTF-8 data.
pub fn cstring_at(data: &[u8], offset: u64, max_len: usize) -> Option<&str> {
    let offset = usize::try_from(offset).ok()?;
    data.read_cstring_at(offset, max_len)
        .filter(|s| !s.is_empty())
}

/// Align a value up to the specified alignment; zero alignment is a no-op.
#[inline(always)]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment).saturating_mul(alignment)
    }
}

/// Align a value down to the specified alignment; zero alignment is a no-op.
#[inline(always)]
pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value - value % alignment
    }
}

/// Check that `[offset, offset + size)` lies inside `data_len` bytes.
#[inline(always)]
pub fn check_bounds(offset: u64, size: u64, data_len: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= data_len => Ok(()),
        _ => Err(PeError::InvalidOffset { offset }),
    }
}
