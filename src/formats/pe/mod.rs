//! Portable Executable support.
//!
//! [`PeLayout`] derives the address mapping and the wrapper tree from image
//! bytes; [`PeExecutable`] is the mapped, mutable image built on it.

pub mod builder;
pub mod directories;
pub mod headers;
pub mod layout;
pub mod sections;
pub mod types;
pub mod utils;

pub use builder::PeBuilder;
pub use layout::PeLayout;
pub use types::*;

use crate::core::mapped::MappedImage;

/// A PE image with its wrapper tree.
pub type PeExecutable = MappedImage<PeLayout>;

/// Cheap signature check: `MZ` followed by a `PE\0\0` at `e_lfanew`.
pub fn looks_like_pe(data: &[u8]) -> bool {
    headers::parse_dos_header(data)
        .ok()
        .and_then(|dos| {
            let at = usize::try_from(dos.e_lfanew).ok()?;
            data.get(at..at.checked_add(4)?)
        })
        .is_some_and(|sig| sig == PE_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::AddressKind;
    use crate::core::buffer::ExeBuffer;
    use crate::core::executable::{BitMode, Executable};
    use crate::core::mapped::MappedExecutable;
    use crate::core::wrapper::{EntryTemplate, WrapperPath};
    use crate::error::ExeError;

    fn load(image: Vec<u8>) -> PeExecutable {
        PeExecutable::new(ExeBuffer::new(&image)).unwrap()
    }

    fn names(exe: &PeExecutable) -> Vec<String> {
        exe.wrappers().iter().map(|w| w.name().to_string()).collect()
    }

    #[test]
    fn test_looks_like_pe() {
        let image = PeBuilder::new().section(".text", vec![0xC3; 0x10]).build();
        assert!(looks_like_pe(&image));
        assert!(!looks_like_pe(b"MZ"));
        assert!(!looks_like_pe(&[0u8; 128]));
    }

    #[test]
    fn test_header_wrappers() {
        let exe = load(PeBuilder::new().section(".text", vec![0xC3; 0x10]).build());
        assert_eq!(
            names(&exe),
            ["DOS Hdr", "File Hdr", "Optional Hdr", "Data Directory", "Section Hdrs"]
        );
        assert_eq!(exe.bit_mode(), BitMode::Bits32);
        assert_eq!(exe.image_base(), 0x400000);
        assert_eq!(exe.entry_point(), 0x1000);

        let dirs = exe.wrapper(3).unwrap().as_node().unwrap();
        assert_eq!(dirs.entries_count(), MAX_DATA_DIRECTORIES);
        assert_eq!(dirs.entry_at(1).unwrap().name(), "Import");
        assert!(!dirs.can_add_entry());

        let sections = exe.wrapper(4).unwrap().as_node().unwrap();
        assert_eq!(sections.entries_count(), 1);
        assert_eq!(sections.entry_at(0).unwrap().name(), ".text");
        assert!(sections.can_add_entry());
    }

    #[test]
    fn test_pe64_optional_header_size() {
        let exe = load(
            PeBuilder::new()
                .pe64(true)
                .image_base(0x1_4000_0000)
                .section(".text", vec![0xC3; 0x10])
                .build(),
        );
        assert_eq!(exe.bit_mode(), BitMode::Bits64);
        assert_eq!(exe.wrapper(2).unwrap().size(), OPTIONAL_HEADER64_SIZE);
        assert_eq!(
            exe.convert_addr(0x1000, AddressKind::Rva, AddressKind::Va),
            Some(0x1_4000_1000)
        );
    }

    #[test]
    fn test_directory_wrappers_in_order() {
        let exe = load(
            PeBuilder::new()
                .section(".text", vec![0xC3; 0x40])
                .import("KERNEL32.dll", &["ExitProcess", "GetModuleHandleA"])
                .import("USER32.dll", &["MessageBoxA"])
                .export("Start")
                .export("Stop")
                .debug_entries(2)
                .tls(true)
                .build(),
        );
        assert_eq!(
            names(&exe)[5..],
            ["Imports", "Exports", "Debug", "TLS"]
        );

        let imports = exe.wrapper_by_name("Imports").unwrap().1.as_node().unwrap();
        assert_eq!(imports.entries_count(), 2);
        let kernel32 = imports.entry_at(0).unwrap();
        assert_eq!(kernel32.name(), "KERNEL32.dll");
        let thunks = kernel32.as_node().unwrap();
        assert_eq!(thunks.entries_count(), 2);
        assert_eq!(thunks.entry_at(1).unwrap().name(), "GetModuleHandleA");

        let exports = exe.wrapper_by_name("Exports").unwrap().1.as_node().unwrap();
        assert_eq!(exports.entries_count(), 2);
        assert_eq!(exports.entry_at(0).unwrap().name(), "Start");

        let debug = exe.wrapper_by_name("Debug").unwrap().1.as_node().unwrap();
        assert_eq!(debug.entries_count(), 2);
    }

    #[test]
    fn test_add_section_header() {
        let mut exe = load(PeBuilder::new().section(".text", vec![0xC3; 0x10]).build());
        let index = exe
            .add_entry(&WrapperPath::top(4), &EntryTemplate::Minimal)
            .unwrap();
        assert_eq!(index, 1);

        let sections = exe.wrapper(4).unwrap().as_node().unwrap();
        assert_eq!(sections.entries_count(), 2);
        assert_eq!(exe.layout().nt_headers().file_header.number_of_sections, 2);
    }

    #[test]
    fn test_tight_section_table_is_full() {
        let mut exe = load(
            PeBuilder::new()
                .tight_headers(true)
                .section(".text", vec![0xC3; 0x10])
                .build(),
        );
        let before = exe.content().to_vec();
        let err = exe
            .add_entry(&WrapperPath::top(4), &EntryTemplate::Minimal)
            .unwrap_err();
        assert!(matches!(err, ExeError::CapacityExceeded { .. }));
        assert_eq!(exe.content(), &before[..]);
    }

    #[test]
    fn test_add_import_descriptor_and_thunk() {
        let mut exe = load(
            PeBuilder::new()
                .section(".text", vec![0xC3; 0x10])
                .import("KERNEL32.dll", &["ExitProcess"])
                .build(),
        );
        let (id, _) = exe.wrapper_by_name("Imports").unwrap();
        let imports = WrapperPath::top(id);

        assert_eq!(exe.add_entry(&imports, &EntryTemplate::Minimal).unwrap(), 1);
        let node = exe.resolve(&imports).unwrap().as_node().unwrap();
        assert_eq!(node.entries_count(), 2);
        assert_eq!(node.entry_at(1).unwrap().name(), "KERNEL32.dll");

        let thunks = imports.child(0);
        assert_eq!(exe.add_entry(&thunks, &EntryTemplate::Minimal).unwrap(), 1);
        let node = exe.resolve(&thunks).unwrap().as_node().unwrap();
        assert_eq!(node.entries_count(), 2);
    }

    #[test]
    fn test_add_export_and_debug_entries() {
        let mut exe = load(
            PeBuilder::new()
                .section(".text", vec![0xC3; 0x10])
                .export("Run")
                .debug_entries(1)
                .build(),
        );
        let exports = WrapperPath::top(exe.wrapper_by_name("Exports").unwrap().0);
        assert_eq!(exe.add_entry(&exports, &EntryTemplate::Minimal).unwrap(), 1);
        let node = exe.resolve(&exports).unwrap().as_node().unwrap();
        assert_eq!(node.entry_at(1).unwrap().name(), "Ordinal: 2");

        let debug = WrapperPath::top(exe.wrapper_by_name("Debug").unwrap().0);
        assert_eq!(exe.add_entry(&debug, &EntryTemplate::Minimal).unwrap(), 1);
        let node = exe.resolve(&debug).unwrap().as_node().unwrap();
        assert_eq!(node.entries_count(), 2);
    }

    #[test]
    fn test_fill_breaking_headers_rolls_back() {
        let mut exe = load(PeBuilder::new().section(".text", vec![0xC3; 0x10]).build());
        let before = exe.content().to_vec();
        let err = exe.fill_content(&WrapperPath::top(0), 0).unwrap_err();
        assert!(matches!(err, ExeError::RewrapRejected(_)));
        assert_eq!(exe.content(), &before[..]);
        assert_eq!(exe.wrappers_count(), 5);
    }

    #[test]
    fn test_fill_section_header() {
        let mut exe = load(PeBuilder::new().section(".text", vec![0xC3; 0x10]).build());
        let path = WrapperPath::top(4).child(0);
        let offset = exe.resolve(&path).unwrap().offset();
        exe.fill_content(&path, 0).unwrap();
        assert!(exe.content()[offset as usize..offset as usize + 40]
            .iter()
            .all(|&b| b == 0));
        assert_eq!(exe.resolve(&path).unwrap().name(), "#0");
    }

    #[test]
    fn test_malformed_directory_is_skipped() {
        let mut image = PeBuilder::new()
            .section(".text", vec![0xC3; 0x10])
            .export("Run")
            .build();
        // Point the export directory far outside the image.
        let slot = 0x40 + 4 + 20 + 96;
        image[slot..slot + 4].copy_from_slice(&0x00F0_0000u32.to_le_bytes());
        let exe = load(image);
        assert!(exe.wrapper_by_name("Exports").is_none());
        assert_eq!(exe.wrappers_count(), 5);
    }
}
