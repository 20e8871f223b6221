//! Per-session state shared by all commands.

use crate::config::ShellConfig;
use crate::core::executable::Executable;

/// The selected executable plus the session configuration.
///
/// One context belongs to one session; commands borrow it for the duration
/// of a single `execute`.
#[derive(Default)]
pub struct ExeContext {
    exe: Option<Box<dyn Executable>>,
    config: ShellConfig,
}

impl ExeContext {
    pub fn new(config: ShellConfig) -> Self {
        Self { exe: None, config }
    }

    /// Select `exe`, returning the previously selected one.
    pub fn set_exe(&mut self, exe: Box<dyn Executable>) -> Option<Box<dyn Executable>> {
        self.exe.replace(exe)
    }

    pub fn exe(&self) -> Option<&dyn Executable> {
        self.exe.as_deref()
    }

    pub fn exe_mut(&mut self) -> Option<&mut (dyn Executable + 'static)> {
        self.exe.as_deref_mut()
    }

    pub fn clear(&mut self) -> Option<Box<dyn Executable>> {
        self.exe.take()
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }
}
