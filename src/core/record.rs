// Length-indicated record codec: one-record read/write plus a sequential reader.
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::format::{LengthField, MAX_LENGTH_FIELD_LEN, MAX_RECORD_ABS};

// Payload buffers start at most this large and grow as bytes actually arrive.
const INITIAL_PAYLOAD_CAPACITY: u64 = 64 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// Read-order index, starting at 0.
    pub seq: u64,
    /// Byte offset of this record's length field.
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        self.payload.to_str_lossy()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodeOptions {
    pub length_field: LengthField,
    pub max_record_len: u64,
}

impl DecodeOptions {
    pub fn new(length_field: LengthField) -> Self {
        Self {
            length_field,
            max_record_len: MAX_RECORD_ABS,
        }
    }

    pub fn with_max_record_len(mut self, max_record_len: u64) -> Self {
        self.max_record_len = max_record_len;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new(LengthField::default())
    }
}

/// Writes one record as `[length][payload]` and returns the bytes written.
pub fn write_record<W: Write>(
    writer: &mut W,
    field: LengthField,
    payload: &[u8],
) -> Result<u64, Error> {
    let header = field.encode(payload.len() as u64)?;
    let width = field.width();
    writer
        .write_all(&header[..width])
        .map_err(|err| write_error(err, "failed to write length field"))?;
    writer
        .write_all(payload)
        .map_err(|err| write_error(err, "failed to write record payload"))?;
    Ok((width + payload.len()) as u64)
}

/// Reads one record from a stream positioned at a record boundary.
///
/// Returns `Ok(None)` when the stream is exhausted exactly at a boundary.
/// A short length field or short payload is `ErrorKind::Truncated`; a length
/// above `MAX_RECORD_ABS` is `ErrorKind::Corrupt`.
pub fn read_record<R: Read>(reader: &mut R, field: LengthField) -> Result<Option<Vec<u8>>, Error> {
    let Some(len) = read_length(reader, field)? else {
        return Ok(None);
    };
    check_max_len(len, MAX_RECORD_ABS)?;
    read_payload(reader, len).map(Some)
}

/// Sequential reader over a length-indicated stream.
///
/// Tracks the read-order index and byte offset of each record so failures can
/// point at the exact record boundary. Stops yielding after the first error.
pub struct RecordReader<R> {
    inner: R,
    field: LengthField,
    max_record_len: u64,
    remaining: Option<u64>,
    path: Option<PathBuf>,
    next_seq: u64,
    offset: u64,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R, field: LengthField) -> Self {
        Self {
            inner,
            field,
            max_record_len: MAX_RECORD_ABS,
            remaining: None,
            path: None,
            next_seq: 0,
            offset: 0,
            done: false,
        }
    }

    pub fn with_options(inner: R, options: &DecodeOptions) -> Self {
        Self::new(inner, options.length_field).with_max_record_len(options.max_record_len)
    }

    pub fn with_max_record_len(mut self, max_record_len: u64) -> Self {
        self.max_record_len = max_record_len;
        self
    }

    /// Declares how many bytes the stream still holds, enabling up-front
    /// truncation checks before any payload is read.
    pub fn with_remaining(mut self, remaining: u64) -> Self {
        self.remaining = Some(remaining);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn length_field(&self) -> LengthField {
        self.field
    }

    /// Byte offset of the next record boundary.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of records read so far.
    pub fn records_read(&self) -> u64 {
        self.next_seq
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_record(&mut self) -> Result<Option<Record>, Error> {
        if self.done {
            return Ok(None);
        }
        let seq = self.next_seq;
        let offset = self.offset;
        match self.read_next(seq, offset) {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(err) => {
                self.done = true;
                if matches!(err.kind(), ErrorKind::Truncated | ErrorKind::Corrupt) {
                    warn!(seq, offset, kind = ?err.kind(), "record read failed");
                }
                let mut err = err.with_seq(seq).with_offset(offset);
                if let Some(path) = &self.path {
                    err = err.with_path(path);
                }
                Err(err)
            }
        }
    }

    fn read_next(&mut self, seq: u64, offset: u64) -> Result<Option<Record>, Error> {
        let Some(len) = read_length(&mut self.inner, self.field)? else {
            return Ok(None);
        };
        check_max_len(len, self.max_record_len)?;

        let width = self.field.width() as u64;
        if let Some(remaining) = self.remaining {
            let available = remaining.saturating_sub(width);
            if len > available {
                return Err(truncated(format!(
                    "record declares {len} bytes but only {available} remain"
                )));
            }
        }

        let payload = read_payload(&mut self.inner, len)?;
        let consumed = width + len;
        self.offset += consumed;
        self.remaining = self.remaining.map(|left| left.saturating_sub(consumed));
        self.next_seq += 1;

        Ok(Some(Record {
            seq,
            offset,
            payload,
        }))
    }
}

impl RecordReader<BufReader<File>> {
    /// Opens a length-indicated file, bounding reads by its current size.
    pub fn open(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| Error::open_failed(path, "input", err))?;
        let size = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;
        debug!(path = %path.display(), size, "opened record file");
        Ok(RecordReader::with_options(BufReader::new(file), options)
            .with_remaining(size)
            .with_path(path))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Reads every record of a file into memory.
pub fn decode_file(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<Vec<Record>, Error> {
    RecordReader::open(path, options)?.collect()
}

fn read_length<R: Read>(reader: &mut R, field: LengthField) -> Result<Option<u64>, Error> {
    let width = field.width();
    let mut buf = [0u8; MAX_LENGTH_FIELD_LEN];
    let filled = read_full(reader, &mut buf[..width])?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < width {
        return Err(truncated(format!(
            "length field cut short after {filled} of {width} bytes"
        )));
    }
    Ok(Some(field.decode(&buf[..width])))
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(read_error(err, "failed to read length field")),
        }
    }
    Ok(filled)
}

fn read_payload<R: Read>(reader: &mut R, len: u64) -> Result<Vec<u8>, Error> {
    let mut payload = Vec::with_capacity(len.min(INITIAL_PAYLOAD_CAPACITY) as usize);
    reader
        .by_ref()
        .take(len)
        .read_to_end(&mut payload)
        .map_err(|err| read_error(err, "failed to read record payload"))?;
    let got = payload.len() as u64;
    if got < len {
        return Err(truncated(format!(
            "payload has {got} of {len} declared bytes"
        )));
    }
    Ok(payload)
}

fn check_max_len(len: u64, max_record_len: u64) -> Result<(), Error> {
    if len > max_record_len {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!(
                "length field {len} exceeds max record length {max_record_len}"
            ))
            .with_hint("Check --length-field, or raise --max-record-bytes if records are this large."));
    }
    Ok(())
}

fn truncated(message: String) -> Error {
    Error::new(ErrorKind::Truncated).with_message(message)
}

fn read_error(err: io::Error, message: &str) -> Error {
    Error::new(ErrorKind::Io).with_message(message).with_source(err)
}

fn write_error(err: io::Error, message: &str) -> Error {
    Error::new(ErrorKind::Io).with_message(message).with_source(err)
}
