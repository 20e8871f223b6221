//! Command registry and dispatch loop.
//!
//! A [`Commander`] maps selector strings to [`CommandKind`]s and runs them
//! against an [`ExeContext`]. Each input line moves the shell from
//! [`ShellState::Idle`] through [`ShellState::Dispatching`] to
//! [`ShellState::Executed`]; lines that do not resolve to a command leave it
//! idle.

pub mod actions;
pub mod command;
pub mod context;
pub mod session;
pub mod util;

use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

pub use command::{CmdParams, CommandKind, ParamError, WrapperAction};
pub use context::ExeContext;
pub use session::ShellIo;

use crate::core::address::AddressKind;
use crate::core::executable::Executable;

/// Where the shell is in handling the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    Dispatching(CommandKind),
    Executed,
}

/// Whether the session continues after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub selector: &'static str,
    pub description: &'static str,
    pub kind: CommandKind,
}

pub struct Commander {
    commands: Vec<CommandEntry>,
    context: ExeContext,
    state: ShellState,
}

impl Commander {
    /// A commander with the standard command set.
    pub fn new(context: ExeContext) -> Self {
        let mut commander = Self::empty(context);
        commander.init_commands();
        commander
    }

    /// A commander with no registered commands.
    pub fn empty(context: ExeContext) -> Self {
        Self {
            commands: Vec::new(),
            context,
            state: ShellState::Idle,
        }
    }

    fn init_commands(&mut self) {
        use AddressKind::{Raw, Rva, Va};

        self.register("info", CommandKind::Info, "Exe Info");
        let conversions = [
            ("r-v", Raw, Rva, "Convert: RAW -> RVA"),
            ("v-r", Rva, Raw, "Convert: RVA -> RAW"),
            ("r-V", Raw, Va, "Convert: RAW -> VA"),
            ("V-r", Va, Raw, "Convert: VA -> RAW"),
            ("v-V", Rva, Va, "Convert: RVA -> VA"),
            ("V-v", Va, Rva, "Convert: VA -> RVA"),
        ];
        for (selector, from, to, description) in conversions {
            self.register(selector, CommandKind::Convert { from, to }, description);
        }
        let fetches = [
            ("printc", Raw, false, "Print content by RAW address (chars)"),
            ("printx", Raw, true, "Print content by RAW address (hex)"),
            ("v-printc", Rva, false, "Print content by RVA (chars)"),
            ("v-printx", Rva, true, "Print content by RVA (hex)"),
        ];
        for (selector, kind, hex, description) in fetches {
            self.register(selector, CommandKind::Fetch { kind, hex }, description);
        }
        self.register("wr", CommandKind::DumpWrapper, "Dump wrapper");
        self.register("e_dump", CommandKind::DumpEntries, "Dump wrapper entries");
        self.register("e_add", CommandKind::AddEntry, "Add entry to wrapper");
        self.register("cl", CommandKind::ClearWrapper, "Clear wrapper content");
        self.register("dump", CommandKind::DumpWrapperToFile, "Dump wrapper to file");
        self.register("save", CommandKind::SaveExe, "Save exe to file");
    }

    /// Register `selector`; returns false if it is already taken.
    pub fn register(
        &mut self,
        selector: &'static str,
        kind: CommandKind,
        description: &'static str,
    ) -> bool {
        if self.lookup(selector).is_some() || is_builtin(selector) {
            warn!(selector, "Selector already registered");
            return false;
        }
        self.commands.push(CommandEntry {
            selector,
            description,
            kind,
        });
        true
    }

    pub fn lookup(&self, selector: &str) -> Option<&CommandEntry> {
        self.commands.iter().find(|c| c.selector == selector)
    }

    /// Registered commands, in registration order.
    pub fn commands(&self) -> &[CommandEntry] {
        &self.commands
    }

    pub fn context(&self) -> &ExeContext {
        &self.context
    }

    pub fn set_exe(&mut self, exe: Box<dyn Executable>) {
        self.context.set_exe(exe);
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    fn transition(&mut self, next: ShellState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Shell state");
            self.state = next;
        }
    }

    fn write_help<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Available commands:")?;
        for command in &self.commands {
            writeln!(out, "  {:<10} - {}", command.selector, command.description)?;
        }
        writeln!(out, "  {:<10} - {}", "h, help", "Show this help")?;
        writeln!(out, "  {:<10} - {}", "q, exit", "Quit")
    }

    /// Handle one input line.
    pub fn execute_line<R, W, E>(&mut self, line: &str, io: &mut ShellIo<R, W, E>) -> io::Result<Flow>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        self.transition(ShellState::Idle);

        let mut words = line.split_whitespace();
        let Some(selector) = words.next() else {
            return Ok(Flow::Continue);
        };
        match selector {
            "q" | "quit" | "exit" => return Ok(Flow::Quit),
            "h" | "help" => {
                self.write_help(io.out())?;
                return Ok(Flow::Continue);
            }
            _ => {}
        }

        let Some(kind) = self.lookup(selector).map(|c| c.kind) else {
            writeln!(io.err(), "Unknown command: {}", selector)?;
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = words.collect();
        let params = match CmdParams::parse(kind, &args) {
            Ok(params) => params,
            Err(err) => {
                writeln!(io.err(), "{}", err)?;
                return Ok(Flow::Continue);
            }
        };

        self.transition(ShellState::Dispatching(kind));
        let result = actions::execute(kind, params, &mut self.context, io);
        self.transition(ShellState::Executed);
        result.map(|_| Flow::Continue)
    }

    /// Read and execute lines until end of input or a quit command.
    pub fn run<R, W, E>(&mut self, io: &mut ShellIo<R, W, E>) -> io::Result<()>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        loop {
            write!(io.out(), "{}", self.context.config().prompt)?;
            io.out().flush()?;
            let Some(line) = io.read_line()? else {
                break;
            };
            if self.execute_line(&line, io)? == Flow::Quit {
                break;
            }
        }
        self.transition(ShellState::Idle);
        Ok(())
    }
}

fn is_builtin(selector: &str) -> bool {
    matches!(selector, "h" | "help" | "q" | "quit" | "exit")
}
