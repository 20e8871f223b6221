//! In-memory PE image synthesis.
//!
//! [`PeBuilder`] produces small but structurally complete PE32/PE32+ images:
//! headers, user sections and, on request, an `.rdata` section holding
//! import, export, debug and TLS directories. Growable tables are followed by
//! `slack` zeroed slots so that entries can be appended in place.

use crate::formats::pe::types::*;
use crate::formats::pe::utils::align_up;

const NT_OFFSET: u32 = 0x40;

#[derive(Debug, Clone)]
struct SectionSpec {
    name: String,
    data: Vec<u8>,
    virtual_size: u32,
    flags: SectionFlags,
}

#[derive(Debug, Clone)]
struct ImportSpec {
    library: String,
    functions: Vec<String>,
}

/// Builder for synthetic PE images.
#[derive(Debug, Clone)]
pub struct PeBuilder {
    pe64: bool,
    image_base: u64,
    entry_point: u32,
    file_alignment: u32,
    section_alignment: u32,
    tight_headers: bool,
    slack: u32,
    sections: Vec<SectionSpec>,
    imports: Vec<ImportSpec>,
    module_name: String,
    exports: Vec<String>,
    debug_entries: u32,
    tls: bool,
}

impl Default for PeBuilder {
    fn default() -> Self {
        Self {
            pe64: false,
            image_base: 0x400000,
            entry_point: 0x1000,
            file_alignment: 0x200,
            section_alignment: 0x1000,
            tight_headers: false,
            slack: 1,
            sections: Vec::new(),
            imports: Vec::new(),
            module_name: "sample.dll".to_string(),
            exports: Vec::new(),
            debug_entries: 0,
            tls: false,
        }
    }
}

/// Zero-extended scratch area for directory data, addressed from `base` RVA.
struct Arena {
    bytes: Vec<u8>,
    base: u32,
}

impl Arena {
    fn alloc(&mut self, size: usize) -> usize {
        let at = self.bytes.len();
        // Keep every allocation 4-byte aligned.
        self.bytes.resize(at + align_up(size as u64, 4) as usize, 0);
        at
    }

    fn alloc_str(&mut self, s: &str) -> usize {
        let at = self.alloc(s.len() + 1);
        put(&mut self.bytes, at, s.as_bytes());
        at
    }

    fn rva(&self, at: usize) -> u32 {
        self.base + at as u32
    }
}

/// Running raw/virtual cursors for section placement.
struct Placement {
    raw: u64,
    va: u64,
    file_alignment: u64,
    section_alignment: u64,
    /// (spec, rva, raw pointer, raw size)
    placed: Vec<(SectionSpec, u64, u64, u64)>,
}

impl Placement {
    fn place(&mut self, spec: SectionSpec) {
        let raw_size = align_up(spec.data.len() as u64, self.file_alignment);
        let pointer = if raw_size == 0 { 0 } else { self.raw };
        let extent = u64::from(spec.virtual_size).max(raw_size).max(1);
        self.placed.push((spec, self.va, pointer, raw_size));
        self.raw += raw_size;
        self.va += align_up(extent, self.section_alignment);
    }
}

fn put(buf: &mut [u8], at: usize, data: &[u8]) {
    buf[at..at + data.len()].copy_from_slice(data);
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    put(buf, at, &value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    put(buf, at, &value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    put(buf, at, &value.to_le_bytes());
}

impl PeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit PE32+ instead of PE32.
    pub fn pe64(mut self, pe64: bool) -> Self {
        self.pe64 = pe64;
        self
    }

    pub fn image_base(mut self, base: u64) -> Self {
        self.image_base = base;
        self
    }

    pub fn entry_point(mut self, rva: u32) -> Self {
        self.entry_point = rva;
        self
    }

    pub fn alignment(mut self, file: u32, section: u32) -> Self {
        self.file_alignment = file;
        self.section_alignment = section;
        self
    }

    /// End `SizeOfHeaders` exactly at the section table so it has no room to grow.
    pub fn tight_headers(mut self, tight: bool) -> Self {
        self.tight_headers = tight;
        self
    }

    /// Number of spare zeroed slots after each growable table.
    pub fn slack(mut self, slots: u32) -> Self {
        self.slack = slots;
        self
    }

    pub fn section(self, name: &str, data: Vec<u8>) -> Self {
        let flags = SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE | SectionFlags::MEM_READ;
        self.section_with(name, data, 0, flags)
    }

    /// Add a section; the virtual size is raised to at least the data length.
    pub fn section_with(
        mut self,
        name: &str,
        data: Vec<u8>,
        virtual_size: u32,
        flags: SectionFlags,
    ) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            virtual_size: virtual_size.max(data.len() as u32),
            data,
            flags,
        });
        self
    }

    pub fn import(mut self, library: &str, functions: &[&str]) -> Self {
        self.imports.push(ImportSpec {
            library: library.to_string(),
            functions: functions.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn export(mut self, name: &str) -> Self {
        self.exports.push(name.to_string());
        self
    }

    pub fn module_name(mut self, name: &str) -> Self {
        self.module_name = name.to_string();
        self
    }

    pub fn debug_entries(mut self, count: u32) -> Self {
        self.debug_entries = count;
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    fn word(&self) -> usize {
        if self.pe64 {
            8
        } else {
            4
        }
    }

    fn optional_header_size(&self) -> u32 {
        let fixed = if self.pe64 {
            OPTIONAL_HEADER64_SIZE
        } else {
            OPTIONAL_HEADER32_SIZE
        };
        (fixed + MAX_DATA_DIRECTORIES as u64 * DATA_DIRECTORY_SIZE) as u32
    }

    fn has_directories(&self) -> bool {
        !self.imports.is_empty() || !self.exports.is_empty() || self.debug_entries > 0 || self.tls
    }

    /// Lay out the directory data at `base` RVA; returns bytes and (slot, rva, size) rows.
    fn build_rdata(&self, base: u32, code_rva: u32) -> (Vec<u8>, Vec<(usize, u32, u32)>) {
        let word = self.word();
        let slack = self.slack as usize;
        let mut arena = Arena {
            bytes: Vec::new(),
            base,
        };
        let mut dirs = Vec::new();

        if !self.imports.is_empty() {
            let count = self.imports.len();
            let table = arena.alloc((count + 1 + slack) * IMPORT_DESCRIPTOR_SIZE as usize);
            for (i, import) in self.imports.iter().enumerate() {
                let funcs = import.functions.len();
                let ilt = arena.alloc((funcs + 1 + slack) * word);
                let iat = arena.alloc((funcs + 1) * word);
                for (j, function) in import.functions.iter().enumerate() {
                    let hint_name = arena.alloc(2 + function.len() + 1);
                    put(&mut arena.bytes, hint_name + 2, function.as_bytes());
                    let rva = u64::from(arena.rva(hint_name));
                    for thunks in [ilt, iat] {
                        put(&mut arena.bytes, thunks + j * word, &rva.to_le_bytes()[..word]);
                    }
                }
                let name = arena.alloc_str(&import.library);
                let desc = table + i * IMPORT_DESCRIPTOR_SIZE as usize;
                let (ilt_rva, name_rva, iat_rva) = (arena.rva(ilt), arena.rva(name), arena.rva(iat));
                put_u32(&mut arena.bytes, desc, ilt_rva);
                put_u32(&mut arena.bytes, desc + 12, name_rva);
                put_u32(&mut arena.bytes, desc + 16, iat_rva);
            }
            dirs.push((
                IMAGE_DIRECTORY_ENTRY_IMPORT,
                arena.rva(table),
                ((count + 1) * IMPORT_DESCRIPTOR_SIZE as usize) as u32,
            ));
        }

        if !self.exports.is_empty() {
            let count = self.exports.len();
            let dir = arena.alloc(EXPORT_DIRECTORY_SIZE as usize);
            let functions = arena.alloc((count + slack) * 4);
            let names = arena.alloc(count * 4);
            let ordinals = arena.alloc(count * 2);
            let module = arena.alloc_str(&self.module_name);
            for (j, export) in self.exports.iter().enumerate() {
                let name = arena.alloc_str(export);
                let name_rva = arena.rva(name);
                put_u32(&mut arena.bytes, functions + j * 4, code_rva + 0x10 * j as u32);
                put_u32(&mut arena.bytes, names + j * 4, name_rva);
                put_u16(&mut arena.bytes, ordinals + j * 2, j as u16);
            }
            let rvas = [
                arena.rva(module),
                1,
                count as u32,
                count as u32,
                arena.rva(functions),
                arena.rva(names),
                arena.rva(ordinals),
            ];
            for (k, value) in rvas.into_iter().enumerate() {
                put_u32(&mut arena.bytes, dir + 12 + k * 4, value);
            }
            let size = (arena.bytes.len() - dir) as u32;
            dirs.push((IMAGE_DIRECTORY_ENTRY_EXPORT, arena.rva(dir), size));
        }

        if self.debug_entries > 0 {
            let count = self.debug_entries as usize;
            let table = arena.alloc((count + slack) * DEBUG_ENTRY_SIZE as usize);
            for i in 0..count {
                // IMAGE_DEBUG_TYPE_CODEVIEW
                put_u32(&mut arena.bytes, table + i * DEBUG_ENTRY_SIZE as usize + 12, 2);
            }
            dirs.push((
                IMAGE_DIRECTORY_ENTRY_DEBUG,
                arena.rva(table),
                (count * DEBUG_ENTRY_SIZE as usize) as u32,
            ));
        }

        if self.tls {
            let size = if self.pe64 { 40 } else { 24 };
            let dir = arena.alloc(size);
            let index = arena.alloc(4);
            let callbacks = arena.alloc(2 * word);
            let va = |at: usize| self.image_base + u64::from(arena.rva(at));
            let values = [va(index), va(index) + 4, va(index), va(callbacks)];
            for (k, value) in values.into_iter().enumerate() {
                put(&mut arena.bytes, dir + k * word, &value.to_le_bytes()[..word]);
            }
            dirs.push((IMAGE_DIRECTORY_ENTRY_TLS, arena.rva(dir), size as u32));
        }

        (arena.bytes, dirs)
    }

    /// Produce the image bytes.
    pub fn build(&self) -> Vec<u8> {
        let fa = u64::from(self.file_alignment);
        let sa = u64::from(self.section_alignment);
        let opt_size = self.optional_header_size();
        let opt_offset = NT_OFFSET as usize + 4 + COFF_HEADER_SIZE as usize;
        let table_offset = opt_offset + opt_size as usize;

        let count = self.sections.len() + usize::from(self.has_directories());
        let headers_end = (table_offset + count * SECTION_HEADER_SIZE as usize) as u64;
        let size_of_headers = if self.tight_headers {
            headers_end
        } else {
            align_up(
                headers_end + u64::from(self.slack) * SECTION_HEADER_SIZE,
                fa,
            )
        };

        let mut cursor = Placement {
            raw: align_up(size_of_headers, fa),
            va: align_up(size_of_headers, sa).max(sa),
            file_alignment: fa,
            section_alignment: sa,
            placed: Vec::new(),
        };
        for spec in &self.sections {
            cursor.place(spec.clone());
        }
        let mut directories = Vec::new();
        if self.has_directories() {
            let code_rva = cursor.placed.first().map(|p| p.1).unwrap_or(cursor.va) as u32;
            let (data, dirs) = self.build_rdata(cursor.va as u32, code_rva);
            directories = dirs;
            cursor.place(SectionSpec {
                name: ".rdata".to_string(),
                virtual_size: data.len() as u32,
                data,
                flags: SectionFlags::CNT_INITIALIZED_DATA | SectionFlags::MEM_READ,
            });
        }
        let size_of_image = cursor.va;
        let file_size = cursor.raw;
        let placed = cursor.placed;

        let mut image = vec![0u8; file_size as usize];

        // DOS header
        put_u16(&mut image, 0, DOS_SIGNATURE);
        put_u16(&mut image, 2, 0x90);
        put_u16(&mut image, 4, 3);
        put_u16(&mut image, 8, 4);
        put_u16(&mut image, 12, 0xFFFF);
        put_u16(&mut image, 16, 0xB8);
        put_u16(&mut image, 24, 0x40);
        put_u32(&mut image, 60, NT_OFFSET);

        // NT signature and file header
        let nt = NT_OFFSET as usize;
        put(&mut image, nt, &PE_SIGNATURE);
        let machine = if self.pe64 {
            Machine::X86_64
        } else {
            Machine::I386
        };
        put_u16(&mut image, nt + 4, u16::from(machine));
        put_u16(&mut image, nt + 6, count as u16);
        put_u16(&mut image, nt + 20, opt_size as u16);
        put_u16(&mut image, nt + 22, if self.pe64 { 0x0022 } else { 0x0102 });

        // Optional header
        let o = opt_offset;
        let magic = if self.pe64 { PE32PLUS_MAGIC } else { PE32_MAGIC };
        put_u16(&mut image, o, magic);
        image[o + 2] = 14;
        let code_size = placed.first().map(|p| p.3).unwrap_or(0) as u32;
        put_u32(&mut image, o + 4, code_size);
        put_u32(&mut image, o + 16, self.entry_point);
        put_u32(&mut image, o + 20, placed.first().map(|p| p.1).unwrap_or(0) as u32);
        if self.pe64 {
            put_u64(&mut image, o + 24, self.image_base);
        } else {
            put_u32(&mut image, o + 28, self.image_base as u32);
        }
        put_u32(&mut image, o + 32, self.section_alignment);
        put_u32(&mut image, o + 36, self.file_alignment);
        put_u16(&mut image, o + 40, 6);
        put_u16(&mut image, o + 48, 6);
        put_u32(&mut image, o + 56, size_of_image as u32);
        put_u32(&mut image, o + 60, size_of_headers as u32);
        put_u16(&mut image, o + 68, 3);
        let word = self.word();
        let reserves = [0x100000u64, 0x1000, 0x100000, 0x1000];
        for (k, value) in reserves.into_iter().enumerate() {
            put(&mut image, o + 72 + k * word, &value.to_le_bytes()[..word]);
        }
        let fixed = (if self.pe64 {
            OPTIONAL_HEADER64_SIZE
        } else {
            OPTIONAL_HEADER32_SIZE
        }) as usize;
        put_u32(&mut image, o + fixed - 4, MAX_DATA_DIRECTORIES as u32);
        for (slot, rva, size) in directories {
            let at = o + fixed + slot * DATA_DIRECTORY_SIZE as usize;
            put_u32(&mut image, at, rva);
            put_u32(&mut image, at + 4, size);
        }

        // Section table and section data
        for (i, (spec, rva, pointer, raw_size)) in placed.iter().enumerate() {
            let at = table_offset + i * SECTION_HEADER_SIZE as usize;
            let name = spec.name.as_bytes();
            let len = name.len().min(8);
            put(&mut image, at, &name[..len]);
            put_u32(&mut image, at + 8, spec.virtual_size);
            put_u32(&mut image, at + 12, *rva as u32);
            put_u32(&mut image, at + 16, *raw_size as u32);
            put_u32(&mut image, at + 20, *pointer as u32);
            put_u32(&mut image, at + 36, spec.flags.bits());
            put(&mut image, *pointer as usize, &spec.data);
        }

        image
    }
}
