//! PE header parsing

use crate::formats::pe::types::*;
use crate::formats::pe::utils::{check_bounds, u16_at, u32_at, u64_at};

/// NT headers plus the file offsets of everything that follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtHeaders {
    /// Offset of the PE signature (`e_lfanew`)
    pub offset: u64,
    pub file_header: CoffHeader,
    pub optional_header: OptionalHeader,
    pub data_directories: Vec<DataDirectory>,
}

impl NtHeaders {
    pub fn file_header_offset(&self) -> u64 {
        self.offset + 4
    }

    pub fn optional_header_offset(&self) -> u64 {
        self.file_header_offset() + COFF_HEADER_SIZE
    }

    pub fn data_directory_offset(&self) -> u64 {
        self.optional_header_offset() + self.optional_header.fixed_size()
    }

    pub fn section_table_offset(&self) -> u64 {
        self.optional_header_offset() + u64::from(self.file_header.size_of_optional_header)
    }

    /// Data directory by slot, or an empty one if the slot is not present.
    pub fn data_directory(&self, index: usize) -> DataDirectory {
        self.data_directories
            .get(index)
            .copied()
            .unwrap_or_default()
    }
}

fn truncated(expected: u64, actual: usize) -> PeError {
    PeError::TruncatedHeader {
        expected,
        actual: actual as u64,
    }
}

/// Parse DOS header from data
pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    if (data.len() as u64) < DOS_HEADER_SIZE {
        return Err(truncated(DOS_HEADER_SIZE, data.len()));
    }

    let e_magic = u16_at(data, 0)?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::InvalidDosSignature);
    }

    Ok(DosHeader {
        e_magic,
        e_lfanew: u32_at(data, 60)?,
    })
}

/// Parse COFF header from data at offset
pub fn parse_coff_header(data: &[u8], offset: u64) -> Result<CoffHeader> {
    check_bounds(offset, COFF_HEADER_SIZE, data.len() as u64)
        .map_err(|_| truncated(offset.saturating_add(COFF_HEADER_SIZE), data.len()))?;

    Ok(CoffHeader {
        machine: Machine::from(u16_at(data, offset)?),
        number_of_sections: u16_at(data, offset + 2)?,
        time_date_stamp: u32_at(data, offset + 4)?,
        size_of_optional_header: u16_at(data, offset + 16)?,
        characteristics: u16_at(data, offset + 18)?,
    })
}

/// Parse the layout-relevant optional header fields at offset
pub fn parse_optional_header(data: &[u8], offset: u64, size: u16) -> Result<OptionalHeader> {
    let size = u64::from(size);
    if size < 2 {
        return Err(truncated(offset + 2, data.len()));
    }
    check_bounds(offset, size, data.len() as u64)
        .map_err(|_| truncated(offset.saturating_add(size), data.len()))?;

    let magic = u16_at(data, offset)?;
    let fixed = match magic {
        PE32_MAGIC => OPTIONAL_HEADER32_SIZE,
        PE32PLUS_MAGIC => OPTIONAL_HEADER64_SIZE,
        _ => return Err(PeError::InvalidMagic(magic)),
    };
    if size < fixed {
        return Err(PeError::TruncatedHeader {
            expected: offset + fixed,
            actual: offset + size,
        });
    }

    let image_base = if magic == PE32PLUS_MAGIC {
        u64_at(data, offset + 24)?
    } else {
        u64::from(u32_at(data, offset + 28)?)
    };

    Ok(OptionalHeader {
        magic,
        address_of_entry_point: u32_at(data, offset + 16)?,
        image_base,
        section_alignment: u32_at(data, offset + 32)?,
        file_alignment: u32_at(data, offset + 36)?,
        size_of_image: u32_at(data, offset + 56)?,
        size_of_headers: u32_at(data, offset + 60)?,
        number_of_rva_and_sizes: u32_at(data, offset + fixed - 4)?,
    })
}

/// Parse the data directories that fit in the optional header.
pub fn parse_data_directories(
    data: &[u8],
    offset: u64,
    available: u64,
    count: u32,
) -> Result<Vec<DataDirectory>> {
    let fit = (available / DATA_DIRECTORY_SIZE).min(MAX_DATA_DIRECTORIES as u64);
    let count = u64::from(count).min(fit);

    (0..count)
        .map(|i| {
            let at = offset + i * DATA_DIRECTORY_SIZE;
            Ok(DataDirectory {
                virtual_address: u32_at(data, at)?,
                size: u32_at(data, at + 4)?,
            })
        })
        .collect()
}

/// Parse NT headers (PE signature + COFF + Optional + data directories)
pub fn parse_nt_headers(data: &[u8], offset: u64) -> Result<NtHeaders> {
    check_bounds(offset, 4, data.len() as u64)
        .map_err(|_| truncated(offset.saturating_add(4), data.len()))?;

    // Bounds checked above.
    let start = offset as usize;
    if data[start..start + 4] != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }

    let file_header = parse_coff_header(data, offset + 4)?;
    let opt_offset = offset + 4 + COFF_HEADER_SIZE;
    let optional_header =
        parse_optional_header(data, opt_offset, file_header.size_of_optional_header)?;

    let fixed = optional_header.fixed_size();
    let available = u64::from(file_header.size_of_optional_header) - fixed;
    let data_directories = parse_data_directories(
        data,
        opt_offset + fixed,
        available,
        optional_header.number_of_rva_and_sizes,
    )?;

    Ok(NtHeaders {
        offset,
        file_header,
        optional_header,
        data_directories,
    })
}
