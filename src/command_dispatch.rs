//! Purpose: Hold top-level CLI command dispatch for `lenrec`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `decode` streams records to stdout as they are read.
//! Invariants: `verify` reports format problems via its output and exit code, not as errors.

use std::io::{BufWriter, Write};

use lenrec::{Record, RecordReader, encode_file, verify_file};

use super::*;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "lenrec", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Encode {
            input,
            output,
            length_field,
            sync,
        } => {
            let options = encode_options(length_field, sync);
            let summary = encode_file(&input, &output, &options)?;
            emit_json(
                json!({
                    "input": input.display().to_string(),
                    "output": output.display().to_string(),
                    "records": summary.records,
                    "payload_bytes": summary.payload_bytes,
                    "bytes": summary.bytes_written,
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Decode {
            input,
            length_field,
            max_record_bytes,
            format,
        } => {
            let options = decode_options(length_field, max_record_bytes);
            let reader = RecordReader::open(&input, &options)?;
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let result = write_records(reader, &mut out, format);
            out.flush().map_err(stdout_error)?;
            result?;
            Ok(RunOutcome::ok())
        }
        Command::Verify {
            input,
            length_field,
            max_record_bytes,
            json,
        } => {
            let options = decode_options(length_field, max_record_bytes);
            let report = verify_file(&input, &options)?;
            if json {
                let value = serde_json::to_value(&report).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode verify report")
                        .with_source(err)
                })?;
                emit_json(value, color_mode);
            } else {
                println!("{}", verify_text(&report));
            }
            Ok(RunOutcome::with_code(verify_exit_code(&report)))
        }
    }
}

fn write_records<R, W>(reader: RecordReader<R>, out: &mut W, format: DecodeFormat) -> Result<u64, Error>
where
    R: io::Read,
    W: Write,
{
    let mut count = 0u64;
    for record in reader {
        let record = record?;
        match format {
            DecodeFormat::Text => {
                out.write_all(record.as_bytes()).map_err(stdout_error)?;
                out.write_all(b"\n").map_err(stdout_error)?;
            }
            DecodeFormat::Jsonl => {
                let line = serde_json::to_string(&record_json(&record)).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode record")
                        .with_source(err)
                })?;
                writeln!(out, "{line}").map_err(stdout_error)?;
            }
        }
        count += 1;
    }
    Ok(count)
}

fn record_json(record: &Record) -> Value {
    json!({
        "index": record.seq,
        "offset": record.offset,
        "len": record.len(),
        "record": record.to_str_lossy(),
    })
}

fn stdout_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write stdout")
        .with_source(err)
}
