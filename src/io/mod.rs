//! Bounded file access for loading and dumping images.
//!
//! [`ImageReader`] memory-maps an input file after checking it against
//! [`IOLimits`] and copies the mapping into an owned [`ExeBuffer`], so the
//! file on disk is never modified in place. [`dump_bytes`] is the sink used
//! by the dump and save commands.

pub mod error;

use crate::core::buffer::ExeBuffer;
use crate::io::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Defines the resource limits for loading an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// A size-checked, memory-mapped view of an image file.
pub struct ImageReader {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    file_size: u64,
}

impl ImageReader {
    /// Opens and maps a file, failing if it exceeds `limits.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening image"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; the mapping is copied out before any mutation.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Copy the mapped content into an owned, mutable buffer.
    pub fn to_buffer(&self) -> ExeBuffer {
        ExeBuffer::new(self.as_bytes())
    }
}

/// Write `bytes` to `path`, replacing any existing file. Returns the count written.
pub fn dump_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<u64> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    info!(path = %path.display(), size = bytes.len(), "Dumped bytes");
    Ok(bytes.len() as u64)
}
