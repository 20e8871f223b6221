//! The closed set of shell operations and their per-invocation parameters.

use thiserror::Error;

use crate::commander::util::{parse_address, parse_number};
use crate::core::address::AddressKind;

/// Operation bound to a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Print sizes, alignments, entry point and the wrapper list.
    Info,
    Convert { from: AddressKind, to: AddressKind },
    /// Print bytes at an address, as hex or as characters.
    Fetch { kind: AddressKind, hex: bool },
    /// Wrapper info plus its child list.
    DumpWrapper,
    /// Wrapper info, then one chosen child with its own children.
    DumpEntries,
    AddEntry,
    ClearWrapper,
    DumpWrapperToFile,
    SaveExe,
}

/// What a wrapper command does once its wrapper id is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperAction {
    Dump,
    DumpEntries,
    AddEntry,
    Clear,
    DumpToFile,
}

/// Rejected command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unexpected argument: {0}")]
    Unexpected(String),
}

/// Values a command may need; anything left `None` is prompted for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdParams {
    pub address: Option<u64>,
    pub wrapper_id: Option<usize>,
    pub entry_index: Option<usize>,
    pub file_name: Option<String>,
}

fn index_arg(arg: &str) -> Result<usize, ParamError> {
    parse_number(arg)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ParamError::InvalidNumber(arg.to_string()))
}

impl CmdParams {
    /// Bind positional arguments following the selector.
    pub fn parse(kind: CommandKind, args: &[&str]) -> Result<Self, ParamError> {
        let mut params = Self::default();
        let mut rest = args.iter();

        match kind {
            CommandKind::Info => {}
            CommandKind::Convert { .. } | CommandKind::Fetch { .. } => {
                if let Some(arg) = rest.next() {
                    let address = parse_address(arg)
                        .ok_or_else(|| ParamError::InvalidAddress(arg.to_string()))?;
                    params.address = Some(address);
                }
            }
            CommandKind::SaveExe => {
                params.file_name = rest.next().map(|s| s.to_string());
            }
            CommandKind::DumpWrapper | CommandKind::AddEntry | CommandKind::ClearWrapper => {
                params.wrapper_id = rest.next().map(|arg| index_arg(arg)).transpose()?;
            }
            CommandKind::DumpEntries => {
                params.wrapper_id = rest.next().map(|arg| index_arg(arg)).transpose()?;
                params.entry_index = rest.next().map(|arg| index_arg(arg)).transpose()?;
            }
            CommandKind::DumpWrapperToFile => {
                params.wrapper_id = rest.next().map(|arg| index_arg(arg)).transpose()?;
                params.file_name = rest.next().map(|s| s.to_string());
            }
        }

        match rest.next() {
            Some(extra) => Err(ParamError::Unexpected(extra.to_string())),
            None => Ok(params),
        }
    }
}
