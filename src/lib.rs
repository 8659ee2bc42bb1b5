//! Purpose: Library crate behind the `lenrec` CLI and its tests.
//! Exports: `core` (length field, record codec, encoder, verifier, errors) and top-level re-exports.
//! Role: Converts text lines into length-indicated record files and reads them back.
//! Invariants: Records are opaque bytes; CSV fields are never parsed.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod core;

pub use crate::core::encode::{
    Durability, EncodeOptions, EncodeSummary, encode_file, encode_lines,
};
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::format::{LengthField, MAX_RECORD_ABS};
pub use crate::core::record::{
    DecodeOptions, Record, RecordReader, decode_file, read_record, write_record,
};
pub use crate::core::verify::{VerifyIssue, VerifyReport, VerifyStatus, verify_file};
