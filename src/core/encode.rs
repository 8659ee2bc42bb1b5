// Text-to-record conversion with all-or-nothing output replacement.
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::core::error::{io_error_kind, Error, ErrorKind};
use crate::core::format::LengthField;
use crate::core::record::write_record;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Durability {
    /// Flush buffers before the rename.
    #[default]
    Fast,
    /// Also fsync the staged file before the rename.
    Flush,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EncodeOptions {
    pub length_field: LengthField,
    pub durability: Durability,
}

impl EncodeOptions {
    pub fn new(length_field: LengthField) -> Self {
        Self {
            length_field,
            durability: Durability::Fast,
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EncodeSummary {
    pub records: u64,
    pub payload_bytes: u64,
    pub bytes_written: u64,
}

/// Writes one record per line of `reader` to `writer`.
///
/// Lines split on `\n`; the terminator (and a `\r` directly before it) is not
/// part of the record, so a record never ends in `\r`. A final unterminated
/// line is still a record.
pub fn encode_lines<R: BufRead, W: Write>(
    mut reader: R,
    writer: &mut W,
    field: LengthField,
) -> Result<EncodeSummary, Error> {
    let mut summary = EncodeSummary::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read input line")
                .with_seq(summary.records)
                .with_source(err)
        })?;
        if read == 0 {
            break;
        }
        let payload = strip_terminator(&line);
        let written =
            write_record(writer, field, payload).map_err(|err| err.with_seq(summary.records))?;
        summary.records += 1;
        summary.payload_bytes += payload.len() as u64;
        summary.bytes_written += written;
    }
    Ok(summary)
}

/// Converts the text file at `input` into a length-indicated file at `output`.
///
/// The input is opened before the output is touched. An existing output must be
/// writable by the caller; a symlinked output is replaced at its target and an
/// existing output keeps its permissions. Records are staged in a temporary
/// file beside the target and renamed over it only once complete, so any
/// failure leaves an existing output unchanged.
pub fn encode_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &EncodeOptions,
) -> Result<EncodeSummary, Error> {
    let input = input.as_ref();
    let output = output.as_ref();

    let source = File::open(input).map_err(|err| Error::open_failed(input, "input", err))?;
    let target = resolve_output(output)?;
    let staged = stage_output(&target.path, output)?;
    debug!(
        input = %input.display(),
        staged = %staged.path().display(),
        "encoding records"
    );

    let mut writer = BufWriter::new(staged);
    let summary = encode_lines(BufReader::new(source), &mut writer, options.length_field)?;

    let staged = writer.into_inner().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush output")
            .with_path(output)
            .with_source(err.into_error())
    })?;
    if options.durability == Durability::Flush {
        staged.as_file().sync_all().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to sync output")
                .with_path(output)
                .with_source(err)
        })?;
    }
    if let Some(permissions) = target.permissions {
        staged.as_file().set_permissions(permissions).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to copy output permissions")
                .with_path(output)
                .with_source(err)
        })?;
    }
    commit_output(staged, &target.path, output)?;

    debug!(
        output = %output.display(),
        records = summary.records,
        bytes = summary.bytes_written,
        "committed record file"
    );
    Ok(summary)
}

// Where the staged file lands, plus the permissions of the file it replaces.
struct OutputTarget {
    path: PathBuf,
    permissions: Option<Permissions>,
}

fn resolve_output(output: &Path) -> Result<OutputTarget, Error> {
    let meta = match fs::symlink_metadata(output) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(OutputTarget {
                path: output.to_path_buf(),
                permissions: None,
            });
        }
        Err(err) => return Err(Error::open_failed(output, "output", err)),
    };
    let path = if meta.file_type().is_symlink() {
        fs::canonicalize(output).map_err(|err| Error::open_failed(output, "output", err))?
    } else {
        output.to_path_buf()
    };
    // No truncate: this only proves the caller may write the existing file.
    let existing = OpenOptions::new()
        .write(true)
        .open(&path)
        .map_err(|err| Error::open_failed(output, "output", err))?;
    let permissions = existing
        .metadata()
        .map_err(|err| Error::open_failed(output, "output", err))?
        .permissions();
    Ok(OutputTarget {
        path,
        permissions: Some(permissions),
    })
}

fn stage_output(target: &Path, output: &Path) -> Result<NamedTempFile, Error> {
    let dir = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut builder = Builder::new();
    builder.prefix(".lenrec-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    builder
        .tempfile_in(dir)
        .map_err(|err| Error::open_failed(output, "output", err))
}

fn commit_output(staged: NamedTempFile, target: &Path, output: &Path) -> Result<(), Error> {
    staged.persist(target).map_err(|err| {
        Error::new(io_error_kind(&err.error))
            .with_message("failed to replace output")
            .with_path(output)
            .with_source(err.error)
    })?;
    Ok(())
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    match line.strip_suffix(b"\n") {
        Some(rest) => rest.strip_suffix(b"\r").unwrap_or(rest),
        None => line,
    }
}
