//! Posting codec.
//!
//! - [`modified9`]: self-describing, word-aligned compression of `u64` sequences
//! - [`posting`]: (document index, position list) records built on it

pub mod modified9;
pub mod posting;

pub use modified9::{decode_ints, encode_ints};
pub use posting::{pack_posting, unpack_posting};
