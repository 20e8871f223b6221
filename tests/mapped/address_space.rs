use exewrap::core::address::{AddressKind, INVALID_ADDR};
use exewrap::core::address_space::convert;
use exewrap::core::buffer::ExeBuffer;
use exewrap::core::executable::{Executable, RawExecutable};
use exewrap::formats::pe::{PeBuilder, SectionFlags};

use crate::common::{load, minimal_pe, IMAGE_BASE};

#[test]
fn entry_point_rva_to_va() {
    let exe = load(&minimal_pe());
    assert_eq!(exe.image_base(), IMAGE_BASE);
    assert_eq!(exe.entry_point(), 0x1000);
    assert_eq!(
        exe.convert_addr(0x1000, AddressKind::Rva, AddressKind::Va),
        Some(0x401000)
    );
}

#[test]
fn identity_holds_for_every_kind() {
    let exe = load(&minimal_pe());
    let raw = RawExecutable::new(ExeBuffer::new(b"abc"));
    for kind in AddressKind::ALL {
        for addr in [0, 0x1000, 0xDEAD_BEEF, INVALID_ADDR] {
            assert_eq!(convert(&exe, addr, kind, kind), Some(addr));
            assert_eq!(convert(&raw, addr, kind, kind), Some(addr));
        }
    }
}

#[test]
fn non_mapped_executable_has_no_virtual_addresses() {
    let raw = RawExecutable::new(ExeBuffer::new(&minimal_pe()));
    assert!(!raw.is_mapped());
    for addr in [0u64, 0x40, 0x200, 0x1000] {
        assert_eq!(raw.convert_addr(addr, AddressKind::Raw, AddressKind::Rva), None);
        assert_eq!(raw.convert_addr(addr, AddressKind::Raw, AddressKind::Va), None);
        assert_eq!(raw.convert_addr(addr, AddressKind::Rva, AddressKind::Raw), None);
        assert_eq!(raw.convert_addr(addr, AddressKind::Va, AddressKind::Raw), None);
    }
}

#[test]
fn rva_va_round_trip_over_mapped_size() {
    let exe = load(&minimal_pe());
    let size = exe.mapped_size(AddressKind::Rva);
    assert_eq!(size, 0x2000);
    for rva in (0..size).step_by(0x7F) {
        let va = exe
            .convert_addr(rva, AddressKind::Rva, AddressKind::Va)
            .expect("in-range RVA maps to a VA");
        assert_eq!(va, IMAGE_BASE + rva);
        assert_eq!(exe.convert_addr(va, AddressKind::Va, AddressKind::Rva), Some(rva));
    }
}

#[test]
fn out_of_range_addresses_are_unrepresentable() {
    let exe = load(&minimal_pe());
    let size = exe.mapped_size(AddressKind::Rva);
    assert_eq!(exe.convert_addr(size, AddressKind::Rva, AddressKind::Va), None);
    assert_eq!(exe.convert_addr(IMAGE_BASE - 1, AddressKind::Va, AddressKind::Rva), None);
    assert_eq!(exe.convert_addr(IMAGE_BASE + size, AddressKind::Va, AddressKind::Rva), None);
    assert_eq!(exe.convert_addr(INVALID_ADDR, AddressKind::Rva, AddressKind::Va), None);

    let raw_size = exe.mapped_size(AddressKind::Raw);
    assert_eq!(exe.convert_addr(raw_size, AddressKind::Raw, AddressKind::Rva), None);
}

#[test]
fn raw_rva_through_section_layout() {
    let exe = load(&minimal_pe());
    assert_eq!(exe.alignment(AddressKind::Raw), 0x200);
    assert_eq!(exe.alignment(AddressKind::Rva), 0x1000);

    // Headers map one to one.
    assert_eq!(exe.convert_addr(0x3C, AddressKind::Raw, AddressKind::Rva), Some(0x3C));
    // First section: raw 0x200 is RVA 0x1000.
    assert_eq!(exe.convert_addr(0x210, AddressKind::Raw, AddressKind::Rva), Some(0x1010));
    assert_eq!(exe.convert_addr(0x401010, AddressKind::Va, AddressKind::Raw), Some(0x210));
    // Gap between the headers and the first section has no file bytes.
    assert_eq!(exe.convert_addr(0x800, AddressKind::Rva, AddressKind::Raw), None);
}

#[test]
fn virtual_only_tail_has_no_raw_offset() {
    let image = PeBuilder::new()
        .section(".text", vec![0xC3; 0x40])
        .section_with(
            ".data",
            vec![1; 0x40],
            0x2800,
            SectionFlags::CNT_INITIALIZED_DATA | SectionFlags::MEM_READ | SectionFlags::MEM_WRITE,
        )
        .build();
    let exe = load(&image);

    // .data starts at RVA 0x2000 with 0x200 raw bytes and 0x3000 mapped.
    assert_eq!(exe.convert_addr(0x2010, AddressKind::Rva, AddressKind::Raw), Some(0x410));
    assert_eq!(exe.convert_addr(0x2400, AddressKind::Rva, AddressKind::Raw), None);
    assert!(exe.convert_addr(0x2400, AddressKind::Rva, AddressKind::Va).is_some());
}

#[test]
fn conversions_follow_mutations() {
    use exewrap::core::mapped::MappedExecutable;
    use exewrap::core::wrapper::{EntryTemplate, WrapperPath};

    let mut exe = load(&minimal_pe());
    let before = exe.convert_addr(0x1010, AddressKind::Rva, AddressKind::Raw);
    assert_eq!(before, Some(0x210));

    // Zeroing the only section header removes its mapping.
    exe.fill_content(&WrapperPath::top(4).child(0), 0).unwrap();
    assert_eq!(exe.convert_addr(0x1010, AddressKind::Rva, AddressKind::Raw), None);

    // Headers still map after the edit.
    assert_eq!(exe.convert_addr(0x40, AddressKind::Raw, AddressKind::Rva), Some(0x40));
    assert!(exe
        .add_entry(&WrapperPath::top(4), &EntryTemplate::Minimal)
        .is_ok());
}
