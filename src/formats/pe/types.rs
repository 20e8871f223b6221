//! Core PE data types and structures

use bitflags::bitflags;
use std::fmt;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

pub const DOS_HEADER_SIZE: u64 = 64;
pub const COFF_HEADER_SIZE: u64 = 20;
pub const OPTIONAL_HEADER32_SIZE: u64 = 96;
pub const OPTIONAL_HEADER64_SIZE: u64 = 112;
pub const DATA_DIRECTORY_SIZE: u64 = 8;
pub const SECTION_HEADER_SIZE: u64 = 40;
pub const IMPORT_DESCRIPTOR_SIZE: u64 = 20;
pub const EXPORT_DIRECTORY_SIZE: u64 = 40;
pub const DEBUG_ENTRY_SIZE: u64 = 28;
pub const MAX_DATA_DIRECTORIES: usize = 16;

// Data directory indices
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const IMAGE_DIRECTORY_ENTRY_DEBUG: usize = 6;
pub const IMAGE_DIRECTORY_ENTRY_TLS: usize = 9;

/// Display names of the data directory slots, in slot order.
pub const DATA_DIRECTORY_NAMES: [&str; MAX_DATA_DIRECTORIES] = [
    "Export",
    "Import",
    "Resource",
    "Exception",
    "Security",
    "Relocation",
    "Debug",
    "Architecture",
    "GlobalPtr",
    "TLS",
    "LoadConfig",
    "BoundImport",
    "IAT",
    "DelayImport",
    ".NET",
    "Reserved",
];

bitflags! {
    /// Section characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

/// PE parsing error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeError {
    InvalidDosSignature,
    InvalidPeSignature,
    InvalidMagic(u16),
    TruncatedHeader { expected: u64, actual: u64 },
    InvalidRva { rva: u64 },
    InvalidOffset { offset: u64 },
    MalformedImportTable,
    MalformedExportTable,
    MalformedDebugDirectory,
    LimitExceeded(&'static str),
}

impl fmt::Display for PeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDosSignature => write!(f, "Invalid DOS signature"),
            Self::InvalidPeSignature => write!(f, "Invalid PE signature"),
            Self::InvalidMagic(m) => write!(f, "Invalid optional header magic: 0x{:04x}", m),
            Self::TruncatedHeader { expected, actual } => {
                write!(
                    f,
                    "Truncated header: expected {} bytes, got {}",
                    expected, actual
                )
            }
            Self::InvalidRva { rva } => write!(f, "Invalid RVA: 0x{:08x}", rva),
            Self::InvalidOffset { offset } => write!(f, "Invalid file offset: 0x{:x}", offset),
            Self::MalformedImportTable => write!(f, "Malformed import table"),
            Self::MalformedExportTable => write!(f, "Malformed export table"),
            Self::MalformedDebugDirectory => write!(f, "Malformed debug directory"),
            Self::LimitExceeded(what) => write!(f, "Limit exceeded: {}", what),
        }
    }
}

impl std::error::Error for PeError {}

pub type Result<T> = std::result::Result<T, PeError>;

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm,    // 0x01c0
    Arm64,  // 0xaa64
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            0x8664 => Self::X86_64,
            0x01c0 => Self::Arm,
            0xaa64 => Self::Arm64,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl From<Machine> for u16 {
    fn from(value: Machine) -> Self {
        match value {
            Machine::Unknown => 0,
            Machine::I386 => 0x014c,
            Machine::X86_64 => 0x8664,
            Machine::Arm => 0x01c0,
            Machine::Arm64 => 0xaa64,
            Machine::Other(other) => other,
        }
    }
}

/// The parts of the DOS header the layout needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_lfanew: u32,
}

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }
}

/// Optional header fields that drive the image layout, for both PE32 and PE32+.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalHeader {
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }

    /// Size of the fixed part, before the data directories.
    pub fn fixed_size(&self) -> u64 {
        if self.is_64bit() {
            OPTIONAL_HEADER64_SIZE
        } else {
            OPTIONAL_HEADER32_SIZE
        }
    }

    /// Offset of NumberOfRvaAndSizes relative to the header start.
    pub fn rva_count_offset(&self) -> u64 {
        self.fixed_size() - 4
    }
}

/// Section header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).to_string()
    }

    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_retain(self.characteristics)
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(SectionFlags::MEM_EXECUTE)
    }
}

// Field tables: (name, offset relative to the structure, width).

pub const DOS_HEADER_FIELDS: &[(&str, u64, u8)] = &[
    ("e_magic", 0, 2),
    ("e_cblp", 2, 2),
    ("e_cp", 4, 2),
    ("e_crlc", 6, 2),
    ("e_cparhdr", 8, 2),
    ("e_minalloc", 10, 2),
    ("e_maxalloc", 12, 2),
    ("e_ss", 14, 2),
    ("e_sp", 16, 2),
    ("e_csum", 18, 2),
    ("e_ip", 20, 2),
    ("e_cs", 22, 2),
    ("e_lfarlc", 24, 2),
    ("e_ovno", 26, 2),
    ("e_oemid", 36, 2),
    ("e_oeminfo", 38, 2),
    ("e_lfanew", 60, 4),
];

pub const FILE_HEADER_FIELDS: &[(&str, u64, u8)] = &[
    ("Machine", 0, 2),
    ("NumberOfSections", 2, 2),
    ("TimeDateStamp", 4, 4),
    ("PointerToSymbolTable", 8, 4),
    ("NumberOfSymbols", 12, 4),
    ("SizeOfOptionalHeader", 16, 2),
    ("Characteristics", 18, 2),
];

const OPTIONAL_HEADER_COMMON: [(&str, u64, u8); 8] = [
    ("Magic", 0, 2),
    ("MajorLinkerVersion", 2, 1),
    ("MinorLinkerVersion", 3, 1),
    ("SizeOfCode", 4, 4),
    ("SizeOfInitializedData", 8, 4),
    ("SizeOfUninitializedData", 12, 4),
    ("AddressOfEntryPoint", 16, 4),
    ("BaseOfCode", 20, 4),
];

// Shared tail after ImageBase; offsets are for PE32, PE32+ adds 4 from SizeOfStackReserve on.
const OPTIONAL_HEADER_TAIL: [(&str, u64, u8); 14] = [
    ("SectionAlignment", 32, 4),
    ("FileAlignment", 36, 4),
    ("MajorOperatingSystemVersion", 40, 2),
    ("MinorOperatingSystemVersion", 42, 2),
    ("MajorImageVersion", 44, 2),
    ("MinorImageVersion", 46, 2),
    ("MajorSubsystemVersion", 48, 2),
    ("MinorSubsystemVersion", 50, 2),
    ("Win32VersionValue", 52, 4),
    ("SizeOfImage", 56, 4),
    ("SizeOfHeaders", 60, 4),
    ("CheckSum", 64, 4),
    ("Subsystem", 68, 2),
    ("DllCharacteristics", 70, 2),
];

/// Field table of the fixed optional header for the given format.
pub fn optional_header_fields(is_64bit: bool) -> Vec<(&'static str, u64, u8)> {
    let mut fields = OPTIONAL_HEADER_COMMON.to_vec();
    if is_64bit {
        fields.push(("ImageBase", 24, 8));
    } else {
        fields.push(("BaseOfData", 24, 4));
        fields.push(("ImageBase", 28, 4));
    }
    fields.extend_from_slice(&OPTIONAL_HEADER_TAIL);
    let word: u8 = if is_64bit { 8 } else { 4 };
    let base = 72u64;
    let step = u64::from(word);
    fields.extend_from_slice(&[
        ("SizeOfStackReserve", base, word),
        ("SizeOfStackCommit", base + step, word),
        ("SizeOfHeapReserve", base + 2 * step, word),
        ("SizeOfHeapCommit", base + 3 * step, word),
        ("LoaderFlags", base + 4 * step, 4),
        ("NumberOfRvaAndSizes", base + 4 * step + 4, 4),
    ]);
    fields
}

pub const DATA_DIRECTORY_FIELDS: &[(&str, u64, u8)] =
    &[("VirtualAddress", 0, 4), ("Size", 4, 4)];

pub const SECTION_HEADER_FIELDS: &[(&str, u64, u8)] = &[
    ("Name", 0, 8),
    ("VirtualSize", 8, 4),
    ("VirtualAddress", 12, 4),
    ("SizeOfRawData", 16, 4),
    ("PointerToRawData", 20, 4),
    ("PointerToRelocations", 24, 4),
    ("PointerToLinenumbers", 28, 4),
    ("NumberOfRelocations", 32, 2),
    ("NumberOfLinenumbers", 34, 2),
    ("Characteristics", 36, 4),
];

pub const IMPORT_DESCRIPTOR_FIELDS: &[(&str, u64, u8)] = &[
    ("OriginalFirstThunk", 0, 4),
    ("TimeDateStamp", 4, 4),
    ("ForwarderChain", 8, 4),
    ("Name", 12, 4),
    ("FirstThunk", 16, 4),
];

pub const EXPORT_DIRECTORY_FIELDS: &[(&str, u64, u8)] = &[
    ("Characteristics", 0, 4),
    ("TimeDateStamp", 4, 4),
    ("MajorVersion", 8, 2),
    ("MinorVersion", 10, 2),
    ("Name", 12, 4),
    ("Base", 16, 4),
    ("NumberOfFunctions", 20, 4),
    ("NumberOfNames", 24, 4),
    ("AddressOfFunctions", 28, 4),
    ("AddressOfNames", 32, 4),
    ("AddressOfNameOrdinals", 36, 4),
];

pub const DEBUG_ENTRY_FIELDS: &[(&str, u64, u8)] = &[
    ("Characteristics", 0, 4),
    ("TimeDateStamp", 4, 4),
    ("MajorVersion", 8, 2),
    ("MinorVersion", 10, 2),
    ("Type", 12, 4),
    ("SizeOfData", 16, 4),
    ("AddressOfRawData", 20, 4),
    ("PointerToRawData", 24, 4),
];
