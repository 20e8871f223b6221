//! Common test utilities and helpers.
//!
//! Every fixture is synthesised in memory, so no sample files are needed.

#![allow(dead_code)]

pub mod test_utils;

use exewrap::core::buffer::ExeBuffer;
use exewrap::formats::pe::{PeBuilder, PeExecutable};

/// Load address used by every fixture.
pub const IMAGE_BASE: u64 = 0x400000;

/// `.text` contents: a run of `ret` instructions.
pub fn text_bytes() -> Vec<u8> {
    vec![0xC3; 0x40]
}

/// One code section, room for one more section header.
pub fn minimal_pe() -> Vec<u8> {
    PeBuilder::new().section(".text", text_bytes()).build()
}

/// Headers end exactly at the section table.
pub fn tight_pe() -> Vec<u8> {
    PeBuilder::new()
        .tight_headers(true)
        .section(".text", text_bytes())
        .build()
}

/// Imports, exports, debug entries and TLS in `.rdata`.
pub fn rich_pe(pe64: bool) -> Vec<u8> {
    PeBuilder::new()
        .pe64(pe64)
        .section(".text", text_bytes())
        .import("KERNEL32.dll", &["ExitProcess", "GetModuleHandleA"])
        .import("USER32.dll", &["MessageBoxA"])
        .export("Start")
        .export("Stop")
        .debug_entries(1)
        .tls(true)
        .build()
}

pub fn load(image: &[u8]) -> PeExecutable {
    PeExecutable::new(ExeBuffer::new(image)).expect("fixture should parse")
}
