//! Section table and RAW <-> RVA layout mapping

use crate::formats::pe::types::*;
use crate::formats::pe::utils::{align_down, align_up, check_bounds, u32_at};

/// Section headers in table order plus the alignment rules used to map them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTable {
    headers: Vec<SectionHeader>,
    size_of_headers: u64,
    file_alignment: u64,
    section_alignment: u64,
}

impl SectionTable {
    pub fn new(
        headers: Vec<SectionHeader>,
        size_of_headers: u32,
        file_alignment: u32,
        section_alignment: u32,
    ) -> Self {
        Self {
            headers,
            size_of_headers: u64::from(size_of_headers),
            file_alignment: u64::from(file_alignment),
            section_alignment: u64::from(section_alignment),
        }
    }

    /// Headers in on-disk table order.
    pub fn headers(&self) -> &[SectionHeader] {
        &self.headers
    }

    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.headers.iter().find(|s| s.name() == name)
    }

    /// Start of the section's raw data, rounded down to the file alignment.
    pub fn raw_start(&self, section: &SectionHeader) -> u64 {
        align_down(u64::from(section.pointer_to_raw_data), self.file_alignment)
    }

    /// Mapped extent of the section, rounded up to the section alignment.
    pub fn virtual_extent(&self, section: &SectionHeader) -> u64 {
        let size = section.virtual_size.max(section.size_of_raw_data);
        align_up(u64::from(size), self.section_alignment)
    }

    /// Convert a file offset to an RVA.
    pub fn raw_to_rva(&self, raw: u64) -> Option<u64> {
        if raw < self.size_of_headers {
            return Some(raw);
        }
        self.headers
            .iter()
            .filter(|s| s.size_of_raw_data != 0)
            .find_map(|s| {
                let start = self.raw_start(s);
                let delta = raw.checked_sub(start)?;
                (delta < u64::from(s.size_of_raw_data) && delta < self.virtual_extent(s))
                    .then(|| u64::from(s.virtual_address) + delta)
            })
    }

    /// Convert an RVA to a file offset; fails for the virtual-only tail of a section.
    pub fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        if rva < self.size_of_headers {
            return Some(rva);
        }
        let section = self.section_containing_rva(rva)?;
        let delta = rva - u64::from(section.virtual_address);
        (delta < u64::from(section.size_of_raw_data)).then(|| self.raw_start(section) + delta)
    }

    pub fn section_containing_rva(&self, rva: u64) -> Option<&SectionHeader> {
        self.headers.iter().find(|s| {
            let start = u64::from(s.virtual_address);
            rva >= start && rva - start < self.virtual_extent(s)
        })
    }

    /// End of the file region containing `raw`: the header area or a section's raw data.
    pub fn region_end(&self, raw: u64) -> Option<u64> {
        if raw < self.size_of_headers {
            return Some(self.size_of_headers);
        }
        self.headers
            .iter()
            .filter(|s| s.size_of_raw_data != 0)
            .find_map(|s| {
                let start = self.raw_start(s);
                let end = start + u64::from(s.size_of_raw_data);
                (raw >= start && raw < end).then_some(end)
            })
    }

    /// Lowest raw data pointer of any section with raw data.
    pub fn first_raw_pointer(&self) -> Option<u64> {
        self.headers
            .iter()
            .filter(|s| s.size_of_raw_data != 0 && s.pointer_to_raw_data != 0)
            .map(|s| self.raw_start(s))
            .min()
    }
}

/// Parse `count` section headers starting at `offset`.
pub fn parse_section_headers(data: &[u8], offset: u64, count: u16) -> Result<Vec<SectionHeader>> {
    let table_size = u64::from(count) * SECTION_HEADER_SIZE;
    check_bounds(offset, table_size, data.len() as u64).map_err(|_| {
        PeError::TruncatedHeader {
            expected: offset.saturating_add(table_size),
            actual: data.len() as u64,
        }
    })?;

    (0..u64::from(count))
        .map(|i| {
            let at = offset + i * SECTION_HEADER_SIZE;
            // Bounds checked for the whole table above.
            let start = at as usize;
            let mut name = [0u8; 8];
            name.copy_from_slice(&data[start..start + 8]);
            Ok(SectionHeader {
                name,
                virtual_size: u32_at(data, at + 8)?,
                virtual_address: u32_at(data, at + 12)?,
                size_of_raw_data: u32_at(data, at + 16)?,
                pointer_to_raw_data: u32_at(data, at + 20)?,
                characteristics: u32_at(data, at + 36)?,
            })
        })
        .collect()
}
