use std::path::Path;
use tracing::{info, warn};

/// Interactive command layer
pub mod commander;
/// Session configuration
pub mod config;
/// Core data types module
pub mod core;
pub mod error;
/// Executable format parsers
pub mod formats;
/// Bounded file access
pub mod io;
pub mod logging;

pub use error::{ExeError, Result};

use crate::config::ShellConfig;
use crate::core::buffer::ExeBuffer;
use crate::core::executable::{Executable, RawExecutable};
use crate::formats::pe::{looks_like_pe, PeExecutable};
use crate::io::ImageReader;

/// Wrap `buffer` as a mapped PE image when it parses as one, else as RAW-only.
pub fn load_buffer(buffer: ExeBuffer, force_raw: bool) -> Box<dyn Executable> {
    if force_raw {
        return Box::new(RawExecutable::new(buffer));
    }
    if !looks_like_pe(buffer.as_slice()) {
        warn!(size = buffer.len(), "Unrecognized format, loading as raw");
        return Box::new(RawExecutable::new(buffer));
    }
    match PeExecutable::new(buffer.clone()) {
        Ok(exe) => Box::new(exe),
        Err(err) => {
            warn!(error = %err, "PE parsing failed, loading as raw");
            Box::new(RawExecutable::new(buffer))
        }
    }
}

/// Read `path` within the configured limits and load it.
pub fn load_executable<P: AsRef<Path>>(
    path: P,
    config: &ShellConfig,
    force_raw: bool,
) -> Result<Box<dyn Executable>> {
    let reader = ImageReader::open(path.as_ref(), &config.io.limits())?;
    let exe = load_buffer(reader.to_buffer(), force_raw);
    info!(
        path = %reader.path().display(),
        size = reader.size(),
        mapped = exe.is_mapped(),
        "Loaded executable"
    );
    Ok(exe)
}
