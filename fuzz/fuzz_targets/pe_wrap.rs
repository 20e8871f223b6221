#![no_main]
use exewrap::core::address::AddressKind;
use exewrap::core::buffer::ExeBuffer;
use exewrap::core::executable::Executable;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let exe = exewrap::load_buffer(ExeBuffer::new(data), false);
    let size = exe.mapped_size(AddressKind::Rva);
    for rva in (0..size.min(0x10000)).step_by(0x100) {
        let _ = exe.convert_addr(rva, AddressKind::Rva, AddressKind::Raw);
        let _ = exe.content_at(rva, AddressKind::Rva, 0x10);
    }
});
