//! Format-agnostic data model.
//!
//! Addresses and their conversion rules, the byte buffer an image lives in,
//! the executable capability traits and the wrapper tree that exposes an
//! image's structures.

pub mod address;
pub mod address_space;
pub mod buffer;
pub mod executable;
pub mod mapped;
pub mod wrapper;
