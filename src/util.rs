//! Shared utility modules.

pub(crate) mod file;
pub mod id;
pub mod varint;
