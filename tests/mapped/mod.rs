//! Integration tests for mapped executables.

mod address_space;
mod mutation;
mod wrappers;
