#![no_main]
use exewrap::core::buffer::ExeBuffer;
use exewrap::core::executable::Executable;
use exewrap::core::mapped::MappedExecutable;
use exewrap::core::wrapper::{EntryTemplate, WrapperPath};
use exewrap::formats::pe::PeExecutable;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, image)) = data.split_first() else {
        return;
    };
    let Ok(mut exe) = PeExecutable::new(ExeBuffer::new(image)) else {
        return;
    };
    let count = exe.wrappers_count();
    if count == 0 {
        return;
    }
    let path = WrapperPath::top(usize::from(selector) % count);
    let before = exe.content().to_vec();
    if exe.add_entry(&path, &EntryTemplate::Minimal).is_err() {
        assert_eq!(exe.content(), &before[..]);
    }
    let _ = exe.fill_content(&path, selector);
});
