//! What each command does against the selected executable.

use std::io::{self, BufRead, Write};
use tracing::debug;

use crate::commander::command::{CmdParams, CommandKind, WrapperAction};
use crate::commander::context::ExeContext;
use crate::commander::session::ShellIo;
use crate::commander::util::{
    dump_entry_info, dump_node_info, write_fetch, write_wrapper_names,
};
use crate::core::address::AddressKind;
use crate::core::executable::Executable;
use crate::core::mapped::MappedExecutable;
use crate::core::wrapper::{EntryTemplate, WrapperPath};
use crate::error::ExeError;
use crate::io::dump_bytes;

const UNMAPPABLE: &str = "This address cannot be mapped";

/// Run one command. Command failures are reported on the session streams;
/// only stream errors are returned.
pub fn execute<R, W, E>(
    kind: CommandKind,
    params: CmdParams,
    ctx: &mut ExeContext,
    io: &mut ShellIo<R, W, E>,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    if ctx.exe().is_none() {
        writeln!(io.err(), "No executable loaded")?;
        return Ok(());
    }
    debug!(?kind, ?params, "Executing command");

    match kind {
        CommandKind::Info => info(ctx, io),
        CommandKind::Convert { from, to } => convert(ctx, io, params.address, from, to),
        CommandKind::Fetch { kind, hex } => fetch(ctx, io, params.address, kind, hex),
        CommandKind::SaveExe => save(ctx, io, params.file_name),
        CommandKind::DumpWrapper => wrapper_command(WrapperAction::Dump, params, ctx, io),
        CommandKind::DumpEntries => wrapper_command(WrapperAction::DumpEntries, params, ctx, io),
        CommandKind::AddEntry => wrapper_command(WrapperAction::AddEntry, params, ctx, io),
        CommandKind::ClearWrapper => wrapper_command(WrapperAction::Clear, params, ctx, io),
        CommandKind::DumpWrapperToFile => {
            wrapper_command(WrapperAction::DumpToFile, params, ctx, io)
        }
    }
}

fn info<R: BufRead, W: Write, E: Write>(ctx: &ExeContext, io: &mut ShellIo<R, W, E>) -> io::Result<()> {
    let Some(exe) = ctx.exe() else {
        return Ok(());
    };
    let out = io.out();
    writeln!(out, "Bit mode: \t{:>10}", exe.bit_mode().bits())?;
    writeln!(
        out,
        "Entry point: \t[{:>10X} {}]",
        exe.entry_point(),
        AddressKind::Rva.to_char()
    )?;
    writeln!(out, "Raw size: \t[{:>10X}]", exe.mapped_size(AddressKind::Raw))?;
    writeln!(out, "Raw align.: \t[{:>10X}]", exe.alignment(AddressKind::Raw))?;
    writeln!(out, "Virtual size: \t[{:>10X}]", exe.mapped_size(AddressKind::Rva))?;
    writeln!(out, "Virtual align.:\t[{:>10X}]", exe.alignment(AddressKind::Rva))?;
    if let Some(mapped) = exe.as_mapped() {
        writeln!(out, "Contains:")?;
        write_wrapper_names(out, mapped)?;
    }
    Ok(())
}

fn address_or_prompt<R: BufRead, W: Write, E: Write>(
    io: &mut ShellIo<R, W, E>,
    address: Option<u64>,
    kind: AddressKind,
) -> io::Result<Option<u64>> {
    match address {
        Some(address) => Ok(Some(address)),
        None => io.prompt_address(kind),
    }
}

fn convert<R: BufRead, W: Write, E: Write>(
    ctx: &ExeContext,
    io: &mut ShellIo<R, W, E>,
    address: Option<u64>,
    from: AddressKind,
    to: AddressKind,
) -> io::Result<()> {
    let Some(exe) = ctx.exe() else {
        return Ok(());
    };
    let Some(addr) = address_or_prompt(io, address, from)? else {
        return Ok(());
    };
    match exe.convert_addr(addr, from, to) {
        Some(out) => {
            writeln!(io.out(), "[{}]\t->\t[{}]:", from.label(), to.label())?;
            writeln!(io.out(), " {:X}\t->\t{:X}", addr, out)
        }
        None => writeln!(io.err(), "{}", UNMAPPABLE),
    }
}

fn fetch<R: BufRead, W: Write, E: Write>(
    ctx: &ExeContext,
    io: &mut ShellIo<R, W, E>,
    address: Option<u64>,
    kind: AddressKind,
    hex: bool,
) -> io::Result<()> {
    let Some(exe) = ctx.exe() else {
        return Ok(());
    };
    let Some(addr) = address_or_prompt(io, address, kind)? else {
        return Ok(());
    };
    match exe.content_at(addr, kind, ctx.config().fetch.length) {
        Some(bytes) => write_fetch(io.out(), addr, kind, bytes, hex),
        None => writeln!(io.err(), "{}", UNMAPPABLE),
    }
}

fn write_dump_result<R: BufRead, W: Write, E: Write>(
    io: &mut ShellIo<R, W, E>,
    name: &str,
    bytes: &[u8],
) -> io::Result<()> {
    match dump_bytes(name, bytes) {
        Ok(size) => writeln!(io.out(), "Dumped size: {} into: {}", size, name),
        Err(err) => writeln!(io.err(), "Dump failed: {}", err),
    }
}

fn save<R: BufRead, W: Write, E: Write>(
    ctx: &ExeContext,
    io: &mut ShellIo<R, W, E>,
    file_name: Option<String>,
) -> io::Result<()> {
    let Some(exe) = ctx.exe() else {
        return Ok(());
    };
    let name = file_name.unwrap_or_else(|| ctx.config().dump.exe_file.clone());
    write_dump_result(io, &name, exe.content())
}

/// Resolve the wrapper id (prompting when absent), then run the wrapper action.
fn wrapper_command<R: BufRead, W: Write, E: Write>(
    action: WrapperAction,
    params: CmdParams,
    ctx: &mut ExeContext,
    io: &mut ShellIo<R, W, E>,
) -> io::Result<()> {
    let fill_value = ctx.config().fill_value;
    let dump_name = params
        .file_name
        .clone()
        .unwrap_or_else(|| ctx.config().dump.wrapper_file.clone());

    let Some(mapped) = ctx.exe_mut().and_then(|exe| exe.as_mapped_mut()) else {
        writeln!(io.err(), "{}", ExeError::NotMapped)?;
        return Ok(());
    };

    let id = match params.wrapper_id {
        Some(id) => id,
        None => {
            write_wrapper_names(io.out(), &*mapped)?;
            match io.prompt_number("wrapperNum")? {
                Some(id) => usize::try_from(id).unwrap_or(usize::MAX),
                None => return Ok(()),
            }
        }
    };
    if mapped.wrapper(id).is_none() {
        writeln!(io.out(), "No such wrapper!")?;
        return Ok(());
    }
    let path = WrapperPath::top(id);

    match action {
        WrapperAction::Dump => dump_wrapper(&*mapped, &path, io),
        WrapperAction::DumpEntries => dump_entries(&*mapped, &path, params.entry_index, io),
        WrapperAction::AddEntry => add_entry(mapped, &path, io),
        WrapperAction::Clear => clear_wrapper(mapped, &path, fill_value, io),
        WrapperAction::DumpToFile => {
            let bytes = mapped.resolve(&path).ok().and_then(|wrapper| {
                let start = usize::try_from(wrapper.offset()).ok()?;
                let end = start.checked_add(usize::try_from(wrapper.size()).ok()?)?;
                mapped.content().get(start..end)
            });
            match bytes {
                Some(bytes) => write_dump_result(io, &dump_name, bytes),
                None => writeln!(io.err(), "Dump failed: wrapper lies outside the image"),
            }
        }
    }
}

fn dump_wrapper<R: BufRead, W: Write, E: Write>(
    mapped: &dyn MappedExecutable,
    path: &WrapperPath,
    io: &mut ShellIo<R, W, E>,
) -> io::Result<()> {
    let Ok(wrapper) = mapped.resolve(path) else {
        return writeln!(io.out(), "No such wrapper!");
    };
    dump_entry_info(io.out(), wrapper, mapped.content())?;
    dump_node_info(io.out(), wrapper)
}

fn dump_entries<R: BufRead, W: Write, E: Write>(
    mapped: &dyn MappedExecutable,
    path: &WrapperPath,
    entry_index: Option<usize>,
    io: &mut ShellIo<R, W, E>,
) -> io::Result<()> {
    let Ok(wrapper) = mapped.resolve(path) else {
        return writeln!(io.out(), "No such wrapper!");
    };
    if !wrapper.is_node() {
        return writeln!(io.err(), "This wrapper has no entries!");
    }
    dump_entry_info(io.out(), wrapper, mapped.content())?;

    let index = match entry_index {
        Some(index) => index,
        None => match io.prompt_number("Dump subentries of Index")? {
            Some(index) => usize::try_from(index).unwrap_or(usize::MAX),
            None => return Ok(()),
        },
    };
    match mapped.resolve(&path.child(index)) {
        Ok(entry) => {
            dump_entry_info(io.out(), entry, mapped.content())?;
            dump_node_info(io.out(), entry)
        }
        Err(err) => writeln!(io.err(), "{}", err),
    }
}

fn add_entry<R: BufRead, W: Write, E: Write>(
    mapped: &mut dyn MappedExecutable,
    path: &WrapperPath,
    io: &mut ShellIo<R, W, E>,
) -> io::Result<()> {
    let can_add = match mapped.resolve(path).map(|w| w.as_node()) {
        Ok(Some(node)) => node.can_add_entry(),
        Ok(None) => return writeln!(io.err(), "This wrapper stores no entries!"),
        Err(_) => return writeln!(io.err(), "Invalid wrapper"),
    };
    if !can_add {
        return writeln!(io.out(), "No space to add entry");
    }
    match mapped.add_entry(path, &EntryTemplate::Minimal) {
        Ok(_) => writeln!(io.out(), "Added!"),
        Err(err) => {
            writeln!(io.out(), "Failed!")?;
            writeln!(io.err(), "{}", err)
        }
    }
}

fn clear_wrapper<R: BufRead, W: Write, E: Write>(
    mapped: &mut dyn MappedExecutable,
    path: &WrapperPath,
    value: u8,
    io: &mut ShellIo<R, W, E>,
) -> io::Result<()> {
    match mapped.fill_content(path, value) {
        Ok(()) => writeln!(io.out(), "Filled!"),
        Err(err) => writeln!(io.out(), "Failed to fill... {}", err),
    }
}
