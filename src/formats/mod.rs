//! Concrete executable formats.

pub mod pe;
