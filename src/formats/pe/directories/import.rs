//! Import table wrappers
//!
//! The descriptor list is a null-terminated node whose entries are the
//! imported libraries; each library is itself a null-terminated node of
//! thunks.

use tracing::debug;

use crate::core::wrapper::{fields_at, Field, ListDiscipline, Node, Wrapper};
use crate::formats::pe::directories::ImageView;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{u32_at, word_at};

const MAX_DESCRIPTORS: usize = 4096;
const MAX_THUNKS: usize = 65536;

/// Build the `Imports` wrapper for the import directory.
pub fn wrap_imports(view: &ImageView<'_>, dir: &DataDirectory) -> Result<Wrapper> {
    let table = view.rva_to_raw(u64::from(dir.virtual_address))?;

    let mut libraries = Vec::new();
    let mut offset = table;
    loop {
        let terminator = view
            .is_zero(offset, IMPORT_DESCRIPTOR_SIZE)
            .ok_or(PeError::MalformedImportTable)?;
        if terminator {
            break;
        }
        if libraries.len() >= MAX_DESCRIPTORS {
            return Err(PeError::LimitExceeded("import descriptors"));
        }
        libraries.push(wrap_library(view, offset)?);
        offset += IMPORT_DESCRIPTOR_SIZE;
    }

    let used = (libraries.len() as u64 + 1) * IMPORT_DESCRIPTOR_SIZE;
    let node = Node::new(
        table,
        IMPORT_DESCRIPTOR_SIZE,
        ListDiscipline::NullTerminated,
        view.growth_capacity(table, used),
        libraries,
    );
    Ok(Wrapper::element("Imports", table, used).with_node(node))
}

fn wrap_library(view: &ImageView<'_>, offset: u64) -> Result<Wrapper> {
    let data = view.data();
    let original_first_thunk = u32_at(data, offset)?;
    let name_rva = u32_at(data, offset + 12)?;
    let first_thunk = u32_at(data, offset + 16)?;

    let name = view
        .string_at_rva(u64::from(name_rva))
        .unwrap_or_else(|| "?".to_string());
    let wrapper = Wrapper::element(name, offset, IMPORT_DESCRIPTOR_SIZE)
        .with_fields(fields_at(offset, IMPORT_DESCRIPTOR_FIELDS));

    let thunk_rva = if original_first_thunk != 0 {
        original_first_thunk
    } else {
        first_thunk
    };
    match view.rva_to_raw(u64::from(thunk_rva)) {
        Ok(table) if thunk_rva != 0 => Ok(wrapper.with_node(wrap_thunks(view, table)?)),
        _ => {
            debug!(offset, thunk_rva, "Import descriptor without a readable thunk list");
            Ok(wrapper)
        }
    }
}

fn wrap_thunks(view: &ImageView<'_>, table: u64) -> Result<Node> {
    let word = view.word_size();
    let ordinal_flag = 1u64 << (word * 8 - 1);

    let mut thunks = Vec::new();
    let mut offset = table;
    loop {
        let value = word_at(view.data(), offset, view.is_64bit())
            .map_err(|_| PeError::MalformedImportTable)?;
        if value == 0 {
            break;
        }
        if thunks.len() >= MAX_THUNKS {
            return Err(PeError::LimitExceeded("import thunks"));
        }
        let name = if value & ordinal_flag != 0 {
            format!("Ordinal: {:#x}", value & 0xFFFF)
        } else {
            // Skip the two-byte hint.
            view.string_at_rva((value & 0x7FFF_FFFF) + 2)
                .unwrap_or_else(|| "?".to_string())
        };
        thunks.push(
            Wrapper::element(name, offset, word)
                .with_fields(vec![Field::new("Thunk", offset, word as u8)]),
        );
        offset += word;
    }

    let used = (thunks.len() as u64 + 1) * word;
    Ok(Node::new(
        table,
        word,
        ListDiscipline::NullTerminated,
        view.growth_capacity(table, used),
        thunks,
    ))
}
