//! PE image layout: address mapping and the wrapper set.

use tracing::{debug, warn};

use crate::core::address::AddressKind;
use crate::core::buffer::ExeBuffer;
use crate::core::executable::BitMode;
use crate::core::mapped::ImageLayout;
use crate::core::wrapper::{fields_at, CountField, ListDiscipline, Node, Wrapper};
use crate::error::Result;
use crate::formats::pe::directories::{wrap_debug, wrap_exports, wrap_imports, wrap_tls, ImageView};
use crate::formats::pe::headers::{parse_dos_header, parse_nt_headers, NtHeaders};
use crate::formats::pe::sections::{parse_section_headers, SectionTable};
use crate::formats::pe::types::*;
use crate::formats::pe::utils::align_up;

/// Everything derived from the bytes of a PE image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeLayout {
    dos_header: DosHeader,
    nt_headers: NtHeaders,
    sections: SectionTable,
    wrappers: Vec<Wrapper>,
}

impl PeLayout {
    pub fn dos_header(&self) -> &DosHeader {
        &self.dos_header
    }

    pub fn nt_headers(&self) -> &NtHeaders {
        &self.nt_headers
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn machine(&self) -> Machine {
        self.nt_headers.file_header.machine
    }

    pub fn is_64bit(&self) -> bool {
        self.nt_headers.optional_header.is_64bit()
    }

    fn build_wrappers(&self, buffer: &ExeBuffer) -> Vec<Wrapper> {
        let nt = &self.nt_headers;
        let mut wrappers = vec![
            Wrapper::element("DOS Hdr", 0, DOS_HEADER_SIZE)
                .with_fields(fields_at(0, DOS_HEADER_FIELDS)),
            Wrapper::element("File Hdr", nt.file_header_offset(), COFF_HEADER_SIZE)
                .with_fields(fields_at(nt.file_header_offset(), FILE_HEADER_FIELDS)),
            Wrapper::element(
                "Optional Hdr",
                nt.optional_header_offset(),
                nt.optional_header.fixed_size(),
            )
            .with_fields(fields_at(
                nt.optional_header_offset(),
                &optional_header_fields(self.is_64bit()),
            )),
            self.data_directory_wrapper(),
            self.section_headers_wrapper(buffer),
        ];
        wrappers.extend(self.directory_wrappers(buffer));
        wrappers
    }

    /// Data directory rows; the table is bounded by the optional header, so it never grows.
    fn data_directory_wrapper(&self) -> Wrapper {
        let nt = &self.nt_headers;
        let table = nt.data_directory_offset();
        let rows = (0..nt.data_directories.len())
            .map(|i| {
                let at = table + i as u64 * DATA_DIRECTORY_SIZE;
                let name = DATA_DIRECTORY_NAMES.get(i).copied().unwrap_or("Reserved");
                Wrapper::element(name, at, DATA_DIRECTORY_SIZE)
                    .with_fields(fields_at(at, DATA_DIRECTORY_FIELDS))
            })
            .collect::<Vec<_>>();
        let used = rows.len() as u64 * DATA_DIRECTORY_SIZE;
        let node = Node::new(
            table,
            DATA_DIRECTORY_SIZE,
            ListDiscipline::Counted(CountField {
                offset: nt.optional_header_offset() + nt.optional_header.rva_count_offset(),
                width: 4,
                step: 1,
            }),
            used,
            rows,
        );
        Wrapper::element("Data Directory", table, used).with_node(node)
    }

    /// Section header table; it may grow into zero bytes before the first section's data.
    fn section_headers_wrapper(&self, buffer: &ExeBuffer) -> Wrapper {
        let nt = &self.nt_headers;
        let table = nt.section_table_offset();
        let rows = self
            .sections
            .headers()
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let at = table + i as u64 * SECTION_HEADER_SIZE;
                let name = match header.name() {
                    name if name.is_empty() => format!("#{}", i),
                    name => name,
                };
                Wrapper::element(name, at, SECTION_HEADER_SIZE)
                    .with_fields(fields_at(at, SECTION_HEADER_FIELDS))
            })
            .collect::<Vec<_>>();

        let used = rows.len() as u64 * SECTION_HEADER_SIZE;
        let limit = [
            Some(u64::from(nt.optional_header.size_of_headers)),
            self.sections.first_raw_pointer(),
            Some(buffer.len() as u64),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(0);
        let capacity = used + buffer.zero_run(table + used, limit);

        let node = Node::new(
            table,
            SECTION_HEADER_SIZE,
            ListDiscipline::Counted(CountField {
                offset: nt.file_header_offset() + 2,
                width: 2,
                step: 1,
            }),
            capacity,
            rows,
        );
        Wrapper::element("Section Hdrs", table, used).with_node(node)
    }

    /// Optional directories, in a fixed order; malformed ones are skipped.
    fn directory_wrappers(&self, buffer: &ExeBuffer) -> Vec<Wrapper> {
        let nt = &self.nt_headers;
        let view = ImageView::new(buffer, &self.sections, self.is_64bit());
        let debug_size_field = nt.data_directory_offset()
            + IMAGE_DIRECTORY_ENTRY_DEBUG as u64 * DATA_DIRECTORY_SIZE
            + 4;

        let mut wrappers = Vec::new();
        for (index, name) in [
            (IMAGE_DIRECTORY_ENTRY_IMPORT, "Imports"),
            (IMAGE_DIRECTORY_ENTRY_EXPORT, "Exports"),
            (IMAGE_DIRECTORY_ENTRY_DEBUG, "Debug"),
            (IMAGE_DIRECTORY_ENTRY_TLS, "TLS"),
        ] {
            let dir = nt.data_directory(index);
            if !dir.is_present() {
                continue;
            }
            let wrapped = match index {
                IMAGE_DIRECTORY_ENTRY_IMPORT => wrap_imports(&view, &dir),
                IMAGE_DIRECTORY_ENTRY_EXPORT => wrap_exports(&view, &dir),
                IMAGE_DIRECTORY_ENTRY_DEBUG => wrap_debug(&view, &dir, debug_size_field),
                _ => wrap_tls(&view, &dir),
            };
            match wrapped {
                Ok(wrapper) => wrappers.push(wrapper),
                Err(err) => warn!(directory = name, error = %err, "Skipping malformed directory"),
            }
        }
        wrappers
    }
}

impl ImageLayout for PeLayout {
    fn parse(buffer: &ExeBuffer) -> Result<Self> {
        let data = buffer.as_slice();
        let dos_header = parse_dos_header(data)?;
        let nt_headers = parse_nt_headers(data, u64::from(dos_header.e_lfanew))?;
        let headers = parse_section_headers(
            data,
            nt_headers.section_table_offset(),
            nt_headers.file_header.number_of_sections,
        )?;

        let opt = &nt_headers.optional_header;
        let sections = SectionTable::new(
            headers,
            opt.size_of_headers,
            opt.file_alignment,
            opt.section_alignment,
        );

        let mut layout = Self {
            dos_header,
            nt_headers,
            sections,
            wrappers: Vec::new(),
        };
        layout.wrappers = layout.build_wrappers(buffer);
        debug!(
            machine = ?layout.machine(),
            sections = layout.sections.headers().len(),
            wrappers = layout.wrappers.len(),
            "Parsed PE layout"
        );
        Ok(layout)
    }

    fn bit_mode(&self) -> BitMode {
        if self.is_64bit() {
            BitMode::Bits64
        } else {
            BitMode::Bits32
        }
    }

    fn entry_point(&self) -> u64 {
        u64::from(self.nt_headers.optional_header.address_of_entry_point)
    }

    fn image_base(&self) -> u64 {
        self.nt_headers.optional_header.image_base
    }

    fn virtual_size(&self) -> u64 {
        let opt = &self.nt_headers.optional_header;
        align_up(
            u64::from(opt.size_of_image),
            u64::from(opt.section_alignment),
        )
    }

    fn alignment(&self, kind: AddressKind) -> u64 {
        let opt = &self.nt_headers.optional_header;
        match kind {
            AddressKind::Raw => u64::from(opt.file_alignment),
            AddressKind::Rva | AddressKind::Va => u64::from(opt.section_alignment),
        }
    }

    fn raw_to_rva(&self, raw: u64) -> Option<u64> {
        self.sections.raw_to_rva(raw)
    }

    fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        self.sections.rva_to_raw(rva)
    }

    fn wrappers(&self) -> &[Wrapper] {
        &self.wrappers
    }
}
