//! Input and output streams of one shell session.

use std::io::{self, BufRead, Write};

use crate::commander::util::{parse_address, parse_number};
use crate::core::address::AddressKind;

/// Line input for commands and prompts, plus result and diagnostic streams.
pub struct ShellIo<R, W, E> {
    input: R,
    out: W,
    err: E,
}

impl<R: BufRead, W: Write, E: Write> ShellIo<R, W, E> {
    pub fn new(input: R, out: W, err: E) -> Self {
        Self { input, out, err }
    }

    /// Stream for command results.
    pub fn out(&mut self) -> &mut W {
        &mut self.out
    }

    /// Stream for diagnostics.
    pub fn err(&mut self) -> &mut E {
        &mut self.err
    }

    pub fn into_parts(self) -> (R, W, E) {
        (self.input, self.out, self.err)
    }

    /// Next input line without its line ending; `None` at end of input.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Print `label` and read the answer.
    pub fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.out, "{}: ", label)?;
        self.out.flush()?;
        self.read_line()
    }

    /// Prompt for a number; bad input is reported and yields `None`.
    pub fn prompt_number(&mut self, label: &str) -> io::Result<Option<u64>> {
        let Some(answer) = self.prompt(label)? else {
            return Ok(None);
        };
        let number = parse_number(&answer);
        if number.is_none() {
            writeln!(self.err, "Invalid number: {}", answer.trim())?;
        }
        Ok(number)
    }

    /// Prompt for a hex address of the given kind.
    pub fn prompt_address(&mut self, kind: AddressKind) -> io::Result<Option<u64>> {
        let label = format!("Enter address [{}]", kind.label());
        let Some(answer) = self.prompt(&label)? else {
            return Ok(None);
        };
        let address = parse_address(&answer);
        if address.is_none() {
            writeln!(self.err, "Invalid address: {}", answer.trim())?;
        }
        Ok(address)
    }
}
