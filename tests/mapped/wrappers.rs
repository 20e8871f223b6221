use exewrap::core::address::AddressKind;
use exewrap::core::buffer::ExeBuffer;
use exewrap::core::executable::{BitMode, Executable};
use exewrap::core::mapped::{ImageLayout, MappedExecutable, MappedImage};
use exewrap::core::wrapper::{EntryTemplate, Wrapper, WrapperPath};
use exewrap::{ExeError, Result};

use crate::common::{load, minimal_pe, rich_pe, tight_pe};

/// Three flat regions over a 64-byte image; the last one overhangs the end.
#[derive(Debug)]
struct ThreeRegions {
    wrappers: Vec<Wrapper>,
}

impl ImageLayout for ThreeRegions {
    fn parse(_buffer: &ExeBuffer) -> Result<Self> {
        Ok(Self {
            wrappers: vec![
                Wrapper::element("Head", 0, 16),
                Wrapper::element("Body", 16, 16),
                Wrapper::element("Tail", 56, 16),
            ],
        })
    }

    fn bit_mode(&self) -> BitMode {
        BitMode::Bits32
    }

    fn entry_point(&self) -> u64 {
        0
    }

    fn image_base(&self) -> u64 {
        0x10000
    }

    fn virtual_size(&self) -> u64 {
        0x40
    }

    fn alignment(&self, _kind: AddressKind) -> u64 {
        1
    }

    fn raw_to_rva(&self, raw: u64) -> Option<u64> {
        Some(raw)
    }

    fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        Some(rva)
    }

    fn wrappers(&self) -> &[Wrapper] {
        &self.wrappers
    }
}

fn three_regions() -> MappedImage<ThreeRegions> {
    let bytes: Vec<u8> = (1..=64).collect();
    MappedImage::new(ExeBuffer::new(&bytes)).unwrap()
}

/// (path, name, offset, size) for every wrapper in the tree.
fn flatten(exe: &dyn MappedExecutable) -> Vec<(String, String, u64, u64)> {
    fn walk(path: WrapperPath, wrapper: &Wrapper, out: &mut Vec<(String, String, u64, u64)>) {
        out.push((
            path.to_string(),
            wrapper.name().to_string(),
            wrapper.offset(),
            wrapper.size(),
        ));
        if let Some(node) = wrapper.as_node() {
            for (index, entry) in node.entries().iter().enumerate() {
                walk(path.child(index), entry, out);
            }
        }
    }

    let mut out = Vec::new();
    for (id, wrapper) in exe.wrappers().iter().enumerate() {
        walk(WrapperPath::top(id), wrapper, &mut out);
    }
    out
}

#[test]
fn rewrap_is_idempotent() {
    for pe64 in [false, true] {
        let mut exe = load(&rich_pe(pe64));
        let first = flatten(&exe);
        exe.wrap().unwrap();
        let second = flatten(&exe);
        exe.wrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second, flatten(&exe));
        assert!(first.iter().any(|(path, name, _, _)| path == "5/0/1" && name == "GetModuleHandleA"));
    }
}

#[test]
fn missing_wrapper_id_is_not_found() {
    let mut exe = three_regions();
    let before = exe.content().to_vec();
    assert_eq!(exe.wrappers_count(), 3);
    assert!(exe.wrapper(5).is_none());
    assert!(matches!(
        exe.resolve(&WrapperPath::top(5)),
        Err(ExeError::NoSuchWrapper(_))
    ));
    assert!(matches!(
        exe.fill_content(&WrapperPath::top(5), 0),
        Err(ExeError::NoSuchWrapper(_))
    ));
    assert_eq!(exe.content(), &before[..]);
    assert_eq!(exe.wrappers_count(), 3);
}

#[test]
fn fill_sixteen_bytes_in_bounds() {
    let mut exe = three_regions();
    exe.fill_content(&WrapperPath::top(1), 0x00).unwrap();
    assert!(exe.content()[16..32].iter().all(|&b| b == 0));
    // Neighbours untouched.
    assert_eq!(exe.content()[15], 16);
    assert_eq!(exe.content()[32], 33);
}

#[test]
fn fill_out_of_bounds_changes_nothing() {
    let mut exe = three_regions();
    let before = exe.content().to_vec();
    let err = exe.fill_content(&WrapperPath::top(2), 0xFF).unwrap_err();
    assert!(matches!(err, ExeError::OutOfBounds { offset: 56, size: 16, len: 64 }));
    assert_eq!(exe.content(), &before[..]);
}

#[test]
fn leaf_wrappers_have_no_entries() {
    let mut exe = three_regions();
    assert!(exe.wrapper(0).unwrap().as_node().is_none());
    assert!(matches!(
        exe.add_entry(&WrapperPath::top(0), &EntryTemplate::Minimal),
        Err(ExeError::NotANode)
    ));
    assert!(matches!(
        exe.resolve(&WrapperPath::top(0).child(0)),
        Err(ExeError::NotANode)
    ));
}

#[test]
fn entry_lookup_never_fabricates() {
    let exe = load(&rich_pe(false));
    for wrapper in exe.wrappers() {
        let Some(node) = wrapper.as_node() else {
            continue;
        };
        let count = node.entries_count();
        for index in 0..count {
            assert!(node.entry_at(index).is_some());
        }
        assert!(node.entry_at(count).is_none());
        assert!(node.entry_at(usize::MAX).is_none());
    }

    let imports = WrapperPath::top(exe.wrapper_by_name("Imports").unwrap().0);
    assert!(matches!(
        exe.resolve(&imports.child(2)),
        Err(ExeError::NoSuchEntry { index: 2, count: 2 })
    ));
}

#[test]
fn children_fit_in_capacity() {
    let exe = load(&rich_pe(true));
    fn check(wrapper: &Wrapper) {
        if let Some(node) = wrapper.as_node() {
            let extent: u64 = node.entries().iter().map(Wrapper::size).sum();
            assert!(extent <= node.capacity(), "{} overflows", wrapper.name());
            assert!(node.used() <= node.capacity());
            node.entries().iter().for_each(check);
        }
    }
    exe.wrappers().iter().for_each(check);
}

#[test]
fn full_node_rejects_entry() {
    let mut exe = load(&tight_pe());
    let path = WrapperPath::top(4);
    let node = exe.resolve(&path).unwrap().as_node().unwrap();
    assert!(!node.can_add_entry());
    assert_eq!(node.used(), node.capacity());
    let count = node.entries_count();

    let err = exe.add_entry(&path, &EntryTemplate::Minimal).unwrap_err();
    assert!(matches!(err, ExeError::CapacityExceeded { .. }));
    let node = exe.resolve(&path).unwrap().as_node().unwrap();
    assert_eq!(node.entries_count(), count);
}

#[test]
fn add_entry_appends_exactly_one() {
    let mut exe = load(&minimal_pe());
    let path = WrapperPath::top(4);
    let node = exe.resolve(&path).unwrap().as_node().unwrap();
    assert!(node.can_add_entry());
    let prior = node.entries_count();

    let index = exe.add_entry(&path, &EntryTemplate::Minimal).unwrap();
    assert_eq!(index, prior);
    let node = exe.resolve(&path).unwrap().as_node().unwrap();
    assert_eq!(node.entries_count(), prior + 1);
    assert!(node.entry_at(index).is_some());
}

#[test]
fn wrapper_by_name_matches_id() {
    let exe = load(&rich_pe(false));
    for (id, wrapper) in exe.wrappers().iter().enumerate() {
        let (found, by_name) = exe.wrapper_by_name(wrapper.name()).unwrap();
        assert_eq!(found, id);
        assert_eq!(by_name, wrapper);
    }
    assert!(exe.wrapper_by_name("Resources").is_none());
}
