//! Export table wrapper
//!
//! The export directory is a node over the export address table, counted by
//! `NumberOfFunctions`. Entries are named through the name/ordinal tables
//! where possible.

use std::collections::HashMap;

use crate::core::wrapper::{fields_at, CountField, Field, ListDiscipline, Node, Wrapper};
use crate::formats::pe::directories::ImageView;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{check_bounds, u16_at, u32_at};

const MAX_EXPORTS: u32 = 65536;

/// Build the `Exports` wrapper for the export directory.
pub fn wrap_exports(view: &ImageView<'_>, dir: &DataDirectory) -> Result<Wrapper> {
    let data = view.data();
    let offset = view.rva_to_raw(u64::from(dir.virtual_address))?;
    check_bounds(offset, EXPORT_DIRECTORY_SIZE, view.len())
        .map_err(|_| PeError::MalformedExportTable)?;

    let ordinal_base = u32_at(data, offset + 16)?;
    let number_of_functions = u32_at(data, offset + 20)?;
    let address_table_rva = u32_at(data, offset + 28)?;

    if number_of_functions > MAX_EXPORTS {
        return Err(PeError::LimitExceeded("exports"));
    }

    let wrapper = Wrapper::element("Exports", offset, EXPORT_DIRECTORY_SIZE)
        .with_fields(fields_at(offset, EXPORT_DIRECTORY_FIELDS));
    if address_table_rva == 0 && number_of_functions == 0 {
        return Ok(wrapper);
    }

    let table = view
        .rva_to_raw(u64::from(address_table_rva))
        .map_err(|_| PeError::MalformedExportTable)?;
    let used = u64::from(number_of_functions) * 4;
    check_bounds(table, used, view.len()).map_err(|_| PeError::MalformedExportTable)?;

    let names = export_names(view, offset);
    let functions = (0..number_of_functions)
        .map(|i| {
            let at = table + u64::from(i) * 4;
            let name = names.get(&i).cloned().unwrap_or_else(|| {
                format!("Ordinal: {}", ordinal_base.wrapping_add(i))
            });
            Wrapper::element(name, at, 4).with_fields(vec![Field::new("FunctionRVA", at, 4)])
        })
        .collect();

    let node = Node::new(
        table,
        4,
        ListDiscipline::Counted(CountField {
            offset: offset + 20,
            width: 4,
            step: 1,
        }),
        view.growth_capacity(table, used),
        functions,
    );
    Ok(wrapper.with_node(node))
}

/// Map export address table index to name; unreadable tables give no names.
fn export_names(view: &ImageView<'_>, offset: u64) -> HashMap<u32, String> {
    let data = view.data();
    let mut names = HashMap::new();
    let (Ok(count), Ok(names_rva), Ok(ordinals_rva)) = (
        u32_at(data, offset + 24),
        u32_at(data, offset + 32),
        u32_at(data, offset + 36),
    ) else {
        return names;
    };
    let (Ok(name_table), Ok(ordinal_table)) = (
        view.rva_to_raw(u64::from(names_rva)),
        view.rva_to_raw(u64::from(ordinals_rva)),
    ) else {
        return names;
    };

    for i in 0..u64::from(count.min(MAX_EXPORTS)) {
        let (Ok(name_rva), Ok(index)) = (
            u32_at(data, name_table + i * 4),
            u16_at(data, ordinal_table + i * 2),
        ) else {
            break;
        };
        if let Some(name) = view.string_at_rva(u64::from(name_rva)) {
            names.insert(u32::from(index), name);
        }
    }
    names
}
