use exewrap::core::executable::Executable;
use exewrap::core::mapped::MappedExecutable;
use exewrap::core::wrapper::{EntryTemplate, WrapperPath};
use exewrap::formats::pe::{PeBuilder, SECTION_HEADER_SIZE};
use exewrap::ExeError;

use crate::common::{load, minimal_pe, rich_pe, text_bytes};

fn top(exe: &dyn MappedExecutable, name: &str) -> WrapperPath {
    WrapperPath::top(exe.wrapper_by_name(name).expect("wrapper present").0)
}

fn count(exe: &dyn MappedExecutable, path: &WrapperPath) -> usize {
    exe.resolve(path)
        .ok()
        .and_then(|w| w.as_node())
        .map(|n| n.entries_count())
        .unwrap_or(0)
}

#[test]
fn minimal_section_header_is_zeroed_and_counted() {
    let mut exe = load(&minimal_pe());
    let path = WrapperPath::top(4);
    let slot = exe.resolve(&path).unwrap().as_node().unwrap().next_entry_offset() as usize;

    exe.add_entry(&path, &EntryTemplate::Minimal).unwrap();

    let content = exe.content();
    assert!(content[slot..slot + SECTION_HEADER_SIZE as usize]
        .iter()
        .all(|&b| b == 0));
    assert_eq!(exe.layout().nt_headers().file_header.number_of_sections, 2);
    let entry = exe.resolve(&path.child(1)).unwrap();
    assert_eq!(entry.name(), "#1");
    assert_eq!(entry.offset(), slot as u64);
}

#[test]
fn section_header_from_bytes() {
    let mut exe = load(&minimal_pe());
    let mut header = vec![0u8; SECTION_HEADER_SIZE as usize];
    header[..4].copy_from_slice(b".new");
    exe.add_entry(&WrapperPath::top(4), &EntryTemplate::Bytes(header))
        .unwrap();
    let sections = exe.layout().sections();
    assert!(sections.section_by_name(".new").is_some());
    assert_eq!(exe.resolve(&WrapperPath::top(4).child(1)).unwrap().name(), ".new");
}

#[test]
fn template_of_wrong_size_is_rejected() {
    let mut exe = load(&minimal_pe());
    let before = exe.content().to_vec();
    let err = exe
        .add_entry(&WrapperPath::top(4), &EntryTemplate::Bytes(vec![0; 8]))
        .unwrap_err();
    assert!(matches!(err, ExeError::TemplateMismatch { expected: 40, actual: 8 }));
    assert_eq!(exe.content(), &before[..]);
}

#[test]
fn import_lists_grow_in_place() {
    for pe64 in [false, true] {
        let mut exe = load(&rich_pe(pe64));
        let imports = top(&exe, "Imports");
        let user32 = imports.child(1);

        assert_eq!(exe.add_entry(&user32, &EntryTemplate::Minimal).unwrap(), 1);
        assert_eq!(count(&exe, &user32), 2);
        // Minimal thunk repeats the previous import.
        assert_eq!(exe.resolve(&user32.child(1)).unwrap().name(), "MessageBoxA");

        assert_eq!(exe.add_entry(&imports, &EntryTemplate::Minimal).unwrap(), 2);
        assert_eq!(count(&exe, &imports), 3);
        assert_eq!(exe.resolve(&imports.child(2)).unwrap().name(), "USER32.dll");
    }
}

#[test]
fn import_slack_is_exhausted() {
    let mut exe = load(&rich_pe(false));
    let imports = top(&exe, "Imports");
    exe.add_entry(&imports, &EntryTemplate::Minimal).unwrap();
    let node = exe.resolve(&imports).unwrap().as_node().unwrap();
    assert!(!node.can_add_entry());
    assert!(matches!(
        exe.add_entry(&imports, &EntryTemplate::Minimal),
        Err(ExeError::CapacityExceeded { .. })
    ));
    assert_eq!(count(&exe, &imports), 3);
}

#[test]
fn empty_thunk_list_needs_a_template() {
    let image = PeBuilder::new()
        .section(".text", text_bytes())
        .import("EMPTY.dll", &[])
        .build();
    let mut exe = load(&image);
    let thunks = top(&exe, "Imports").child(0);
    assert_eq!(count(&exe, &thunks), 0);

    assert!(matches!(
        exe.add_entry(&thunks, &EntryTemplate::Minimal),
        Err(ExeError::NoTemplate)
    ));

    let by_ordinal = 0x8000_0007u32.to_le_bytes().to_vec();
    exe.add_entry(&thunks, &EntryTemplate::Bytes(by_ordinal)).unwrap();
    assert_eq!(exe.resolve(&thunks.child(0)).unwrap().name(), "Ordinal: 0x7");
}

#[test]
fn zero_thunk_would_terminate_the_list() {
    let mut exe = load(&rich_pe(false));
    let thunks = top(&exe, "Imports").child(1);
    let before = exe.content().to_vec();
    let err = exe
        .add_entry(&thunks, &EntryTemplate::Bytes(vec![0; 4]))
        .unwrap_err();
    assert!(matches!(err, ExeError::EntryNotRegistered));
    assert_eq!(exe.content(), &before[..]);
    assert_eq!(count(&exe, &thunks), 1);
}

#[test]
fn export_and_debug_counts_follow_adds() {
    let mut exe = load(&rich_pe(false));
    let exports = top(&exe, "Exports");
    let debug = top(&exe, "Debug");

    assert_eq!(exe.add_entry(&exports, &EntryTemplate::Minimal).unwrap(), 2);
    assert_eq!(count(&exe, &exports), 3);
    assert_eq!(exe.resolve(&exports.child(2)).unwrap().name(), "Ordinal: 3");

    assert_eq!(exe.add_entry(&debug, &EntryTemplate::Minimal).unwrap(), 1);
    assert_eq!(count(&exe, &debug), 2);
    let dir = exe
        .layout()
        .nt_headers()
        .data_directory(exewrap::formats::pe::IMAGE_DIRECTORY_ENTRY_DEBUG);
    assert_eq!(dir.size, 2 * 28);
}

#[test]
fn clearing_a_directory_row_drops_its_wrapper() {
    let mut exe = load(&rich_pe(false));
    let debug_row = WrapperPath::top(3).child(exewrap::formats::pe::IMAGE_DIRECTORY_ENTRY_DEBUG);
    assert_eq!(exe.resolve(&debug_row).unwrap().name(), "Debug");

    exe.fill_content(&debug_row, 0).unwrap();
    assert!(exe.wrapper_by_name("Debug").is_none());
    assert!(exe.wrapper_by_name("TLS").is_some());
}

#[test]
fn rejected_fill_keeps_wrappers() {
    for name in ["File Hdr", "Optional Hdr"] {
        let mut exe = load(&rich_pe(false));
        let before = exe.wrappers().to_vec();
        let content = exe.content().to_vec();

        let path = top(&exe, name);
        let err = exe.fill_content(&path, 0).unwrap_err();
        assert!(matches!(err, ExeError::RewrapRejected(_)), "{}", name);
        assert_eq!(exe.wrappers(), &before[..]);
        assert_eq!(exe.content(), &content[..]);
    }
}
