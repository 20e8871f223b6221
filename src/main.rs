use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use exewrap::commander::{Commander, ExeContext, Flow, ShellIo};
use exewrap::config::ShellConfig;
use exewrap::logging;

/// Inspect and edit the structure of an executable image.
///
/// Without `-c` the shell reads commands from stdin until end of input or
/// `q`. Type `h` for the command list.
#[derive(Parser, Debug)]
#[command(name = "exewrap", version, about, long_about = None)]
struct Cli {
    /// Executable to load.
    file: PathBuf,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,

    /// Load without format parsing (RAW addresses only).
    #[arg(long)]
    raw: bool,

    /// Run these command lines in order, then exit.
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    commands: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_tracing_json();
    } else {
        logging::init_tracing();
    }

    let config = match &cli.config {
        Some(path) => ShellConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ShellConfig::default(),
    };
    let exe = exewrap::load_executable(&cli.file, &config, cli.raw)
        .with_context(|| format!("failed to load {}", cli.file.display()))?;

    let mut commander = Commander::new(ExeContext::new(config));
    commander.set_exe(exe);

    let stdin = io::stdin();
    let mut shell = ShellIo::new(stdin.lock(), io::stdout().lock(), io::stderr().lock());
    if cli.commands.is_empty() {
        commander.run(&mut shell).context("shell I/O failed")?;
    } else {
        run_script(&mut commander, &mut shell, &cli.commands)?;
    }
    Ok(())
}

fn run_script<R, W, E>(
    commander: &mut Commander,
    shell: &mut ShellIo<R, W, E>,
    lines: &[String],
) -> Result<()>
where
    R: BufRead,
    W: io::Write,
    E: io::Write,
{
    for line in lines {
        let flow = commander
            .execute_line(line, shell)
            .with_context(|| format!("command failed: {}", line))?;
        if flow == Flow::Quit {
            break;
        }
    }
    Ok(())
}
