//! Debug directory wrapper

use crate::core::wrapper::{fields_at, CountField, ListDiscipline, Node, Wrapper};
use crate::formats::pe::directories::ImageView;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{check_bounds, u32_at};

const MAX_DEBUG_ENTRIES: u64 = 256;

fn debug_type_name(kind: u32) -> String {
    let name = match kind {
        1 => "COFF",
        2 => "CodeView",
        3 => "FPO",
        4 => "Misc",
        5 => "Exception",
        6 => "Fixup",
        9 => "Borland",
        11 => "CLSID",
        12 => "VC Feature",
        13 => "POGO",
        14 => "ILTCG",
        15 => "MPX",
        16 => "Repro",
        20 => "Ex DllCharacteristics",
        other => return format!("Type {}", other),
    };
    name.to_string()
}

/// Build the `Debug` wrapper; the entry count lives in the directory's `Size`
/// field at `size_field`.
pub fn wrap_debug(view: &ImageView<'_>, dir: &DataDirectory, size_field: u64) -> Result<Wrapper> {
    let table = view.rva_to_raw(u64::from(dir.virtual_address))?;
    let count = u64::from(dir.size) / DEBUG_ENTRY_SIZE;
    if count > MAX_DEBUG_ENTRIES {
        return Err(PeError::LimitExceeded("debug entries"));
    }
    let used = count * DEBUG_ENTRY_SIZE;
    check_bounds(table, used, view.len()).map_err(|_| PeError::MalformedDebugDirectory)?;

    let entries = (0..count)
        .map(|i| {
            let at = table + i * DEBUG_ENTRY_SIZE;
            let kind = u32_at(view.data(), at + 12)?;
            Ok(Wrapper::element(debug_type_name(kind), at, DEBUG_ENTRY_SIZE)
                .with_fields(fields_at(at, DEBUG_ENTRY_FIELDS)))
        })
        .collect::<Result<Vec<_>>>()?;

    let node = Node::new(
        table,
        DEBUG_ENTRY_SIZE,
        ListDiscipline::Counted(CountField {
            offset: size_field,
            width: 4,
            step: DEBUG_ENTRY_SIZE,
        }),
        view.growth_capacity(table, used),
        entries,
    );
    Ok(Wrapper::element("Debug", table, used).with_node(node))
}
