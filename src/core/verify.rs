//! Purpose: Scan a whole length-indicated file and report its health.
//! Exports: `VerifyStatus`, `VerifyIssue`, `VerifyReport`, `verify_file`.
//! Role: Backs the `verify` command; callers that only need records use `RecordReader`.
//! Invariants: Open failures are errors; format problems are reported, not returned as errors.
//! Invariants: `last_good_offset` is always a record boundary.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::record::{DecodeOptions, RecordReader};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Ok,
    Truncated,
    Corrupt,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VerifyIssue {
    pub message: String,
    pub seq: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VerifyReport {
    pub path: PathBuf,
    pub status: VerifyStatus,
    pub records: u64,
    pub payload_bytes: u64,
    pub last_good_offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<VerifyIssue>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.status == VerifyStatus::Ok
    }
}

pub fn verify_file(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<VerifyReport, Error> {
    let path = path.as_ref();
    let mut reader = RecordReader::open(path, options)?;
    let mut payload_bytes = 0u64;

    let issue = loop {
        match reader.read_record() {
            Ok(Some(record)) => payload_bytes += record.len() as u64,
            Ok(None) => break None,
            Err(err) => {
                let status = match err.kind() {
                    ErrorKind::Truncated => VerifyStatus::Truncated,
                    ErrorKind::Corrupt => VerifyStatus::Corrupt,
                    _ => return Err(err),
                };
                break Some((status, err));
            }
        }
    };

    let (status, issue) = match issue {
        None => (VerifyStatus::Ok, None),
        Some((status, err)) => (
            status,
            Some(VerifyIssue {
                message: err.message().unwrap_or("invalid record").to_string(),
                seq: err.seq(),
                offset: err.offset(),
            }),
        ),
    };

    Ok(VerifyReport {
        path: path.to_path_buf(),
        status,
        records: reader.records_read(),
        payload_bytes,
        last_good_offset: reader.offset(),
        issue,
    })
}
