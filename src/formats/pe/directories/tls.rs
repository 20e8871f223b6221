//! TLS directory wrapper

use crate::core::wrapper::{fields_at, Wrapper};
use crate::formats::pe::directories::ImageView;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::check_bounds;

/// Size of the TLS directory for the image's word size.
pub fn tls_directory_size(is_64bit: bool) -> u64 {
    if is_64bit {
        40
    } else {
        24
    }
}

/// Build the `TLS` element wrapper.
pub fn wrap_tls(view: &ImageView<'_>, dir: &DataDirectory) -> Result<Wrapper> {
    let offset = view.rva_to_raw(u64::from(dir.virtual_address))?;
    let size = tls_directory_size(view.is_64bit());
    check_bounds(offset, size, view.len())?;

    let word = view.word_size() as u8;
    let w = u64::from(word);
    let fields = fields_at(
        offset,
        &[
            ("StartAddressOfRawData", 0, word),
            ("EndAddressOfRawData", w, word),
            ("AddressOfIndex", 2 * w, word),
            ("AddressOfCallBacks", 3 * w, word),
            ("SizeOfZeroFill", 4 * w, 4),
            ("Characteristics", 4 * w + 4, 4),
        ],
    );
    Ok(Wrapper::element("TLS", offset, size).with_fields(fields))
}
