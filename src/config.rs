//! Configuration for the command shell.
//!
//! Every section has defaults, so a config file only needs the keys it
//! changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ExeError, Result};
use crate::io::IOLimits;

/// Master configuration for a shell session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// File loading limits.
    pub io: IoConfig,
    /// Default targets for the dump commands.
    pub dump: DumpConfig,
    /// Fetch command configuration.
    pub fetch: FetchConfig,
    /// Byte written by the clear command.
    pub fill_value: u8,
    /// Prompt printed before each interactive line.
    pub prompt: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            io: IoConfig::default(),
            dump: DumpConfig::default(),
            fetch: FetchConfig::default(),
            fill_value: 0,
            prompt: "$ ".to_string(),
        }
    }
}

impl ShellConfig {
    /// Load a JSON config file; missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch.length == 0 {
            return Err(ExeError::Config("fetch.length must be positive".into()));
        }
        if self.dump.wrapper_file.is_empty() || self.dump.exe_file.is_empty() {
            return Err(ExeError::Config("dump targets must be non-empty".into()));
        }
        Ok(())
    }
}

/// Configuration for I/O operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Maximum file size to load, in bytes.
    pub max_file_size: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_size: IOLimits::default().max_file_size,
        }
    }
}

impl IoConfig {
    pub fn limits(&self) -> IOLimits {
        IOLimits {
            max_file_size: self.max_file_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Target used by `dump` when no file name is given.
    pub wrapper_file: String,
    /// Target used by `save` when no file name is given.
    pub exe_file: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            wrapper_file: "dumped.txt".to_string(),
            exe_file: "dumped.exe".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Bytes shown by the fetch commands.
    pub length: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { length: 0x100 }
    }
}
