//! Purpose: Define the length field that prefixes every record on disk.
//! Exports: `LengthField`, `MAX_LENGTH_FIELD_LEN`, `MAX_RECORD_ABS`.
//! Role: Single source of truth for prefix width and byte order.
//! Invariants: A length field always equals the payload byte count that follows it.
//! Invariants: `U64Le` is the portable default; `Native` exists for legacy files only.

use std::mem::size_of;

use crate::core::error::{Error, ErrorKind};

/// Widest prefix any variant uses.
pub const MAX_LENGTH_FIELD_LEN: usize = 8;
/// Default upper bound on a single decoded payload.
pub const MAX_RECORD_ABS: u64 = 256 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LengthField {
    /// 8-byte little-endian unsigned length.
    #[default]
    U64Le,
    /// 4-byte little-endian unsigned length.
    U32Le,
    /// Host pointer width in host byte order, as written by the legacy converter.
    Native,
}

impl LengthField {
    pub fn width(self) -> usize {
        match self {
            LengthField::U64Le => size_of::<u64>(),
            LengthField::U32Le => size_of::<u32>(),
            LengthField::Native => size_of::<usize>(),
        }
    }

    /// Largest payload length this field can describe.
    pub fn max_len(self) -> u64 {
        match self {
            LengthField::U64Le => u64::MAX,
            LengthField::U32Le => u64::from(u32::MAX),
            LengthField::Native => usize::MAX as u64,
        }
    }

    /// Encodes `len` into the first `width()` bytes of the returned buffer.
    pub fn encode(self, len: u64) -> Result<[u8; MAX_LENGTH_FIELD_LEN], Error> {
        if len > self.max_len() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "record of {len} bytes does not fit a {}-byte length field",
                    self.width()
                ))
                .with_hint("Use --length-field u64le for long records."));
        }
        let mut buf = [0u8; MAX_LENGTH_FIELD_LEN];
        match self {
            LengthField::U64Le => buf.copy_from_slice(&len.to_le_bytes()),
            LengthField::U32Le => buf[..4].copy_from_slice(&(len as u32).to_le_bytes()),
            LengthField::Native => {
                buf[..size_of::<usize>()].copy_from_slice(&(len as usize).to_ne_bytes())
            }
        }
        Ok(buf)
    }

    /// Decodes a length from exactly `width()` bytes.
    pub fn decode(self, buf: &[u8]) -> u64 {
        debug_assert_eq!(buf.len(), self.width());
        match self {
            LengthField::U64Le => u64::from_le_bytes(read_8(buf)),
            LengthField::U32Le => u64::from(u32::from_le_bytes(read_4(buf))),
            LengthField::Native => {
                let mut out = [0u8; size_of::<usize>()];
                out.copy_from_slice(&buf[..size_of::<usize>()]);
                usize::from_ne_bytes(out) as u64
            }
        }
    }
}

fn read_4(buf: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[..4]);
    out
}

fn read_8(buf: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[..8]);
    out
}
