//! Parsing and formatting shared by the shell commands.

use std::io::{self, Write};

use crate::core::address::AddressKind;
use crate::core::mapped::MappedExecutable;
use crate::core::wrapper::{Field, Wrapper};

/// Bytes per row in fetch output.
const FETCH_ROW: usize = 16;

/// `0x`-prefixed hex or plain decimal.
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Addresses are hex with or without a `0x` prefix.
pub fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// Current value of a little-endian field.
pub fn field_value(content: &[u8], field: &Field) -> Option<u64> {
    let start = usize::try_from(field.offset).ok()?;
    let bytes = content.get(start..start.checked_add(usize::from(field.width))?)?;
    if bytes.len() > 8 {
        return None;
    }
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    Some(u64::from_le_bytes(raw))
}

pub fn write_wrapper_names<W: Write>(out: &mut W, exe: &dyn MappedExecutable) -> io::Result<()> {
    for (id, wrapper) in exe.wrappers().iter().enumerate() {
        writeln!(out, "[{:>2}] {}", id, wrapper.name())?;
    }
    Ok(())
}

/// Name, range and field values of one wrapper.
pub fn dump_entry_info<W: Write>(out: &mut W, wrapper: &Wrapper, content: &[u8]) -> io::Result<()> {
    writeln!(
        out,
        "[{}] offset: {:X} size: {:X}",
        wrapper.name(),
        wrapper.offset(),
        wrapper.size()
    )?;
    for field in wrapper.fields() {
        match field_value(content, field) {
            Some(value) => writeln!(out, "  {:<28}{:>16X}", field.name, value)?,
            None => writeln!(out, "  {:<28}{:>16}", field.name, "?")?,
        }
    }
    Ok(())
}

/// Child list and capacity of a node; prints nothing for a leaf.
pub fn dump_node_info<W: Write>(out: &mut W, wrapper: &Wrapper) -> io::Result<()> {
    let Some(node) = wrapper.as_node() else {
        return Ok(());
    };
    writeln!(
        out,
        "Entries: {} [entry size: {:X}, used: {:X}, capacity: {:X}]",
        node.entries_count(),
        node.entry_size(),
        node.used(),
        node.capacity()
    )?;
    for (index, entry) in node.entries().iter().enumerate() {
        writeln!(out, "[{:>2}] {}", index, entry.name())?;
    }
    Ok(())
}

/// Hex rows or a printable-character run, prefixed with the start address.
pub fn write_fetch<W: Write>(
    out: &mut W,
    addr: u64,
    kind: AddressKind,
    bytes: &[u8],
    hex: bool,
) -> io::Result<()> {
    writeln!(out, "[{:X} {}]", addr, kind.to_char())?;
    if hex {
        for row in bytes.chunks(FETCH_ROW) {
            let line = row
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{}", line)?;
        }
    } else {
        let text: String = bytes
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    char::from(b)
                } else {
                    '.'
                }
            })
            .collect();
        writeln!(out, "{}", text)?;
    }
    Ok(())
}
