//! Column encodings used by batched event-log records.
//!
//! - [`varint`]: base-128 continuation integers
//! - [`delta`]: fixed-width delta columns with optional holes
//! - [`blob`]: length-prefixed byte blobs

pub mod blob;
pub mod delta;
pub mod varint;

pub use blob::{decode_blobs, encode_blobs};
pub use delta::{DeltaEncodingHeader, decode_deltas, encode_deltas};
pub use varint::{decode_varint, encode_varint, write_varint};
