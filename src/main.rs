//! Purpose: `lenrec` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits results on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `lenrec::to_exit_code`.
//! Invariants: Log output goes to stderr only and is filtered by `RUST_LOG` (default `error`).
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use lenrec::{
    DecodeOptions, Durability, EncodeOptions, Error, ErrorKind, LengthField, MAX_RECORD_ABS,
    VerifyReport, VerifyStatus, to_exit_code,
};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;

    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_format_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "lenrec",
    version,
    about = "Convert CSV text into length-indicated record files and read them back",
    long_about = None,
    after_help = r#"EXAMPLES
  $ lenrec encode people.csv people.bin
  $ lenrec decode people.bin
  $ lenrec decode people.bin --format jsonl
  $ lenrec verify people.bin

Each line of the input becomes one record: a length field followed by the
line's bytes. The default length field is an 8-byte little-endian integer."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LengthFieldArg {
    U64le,
    U32le,
    Native,
}

impl From<LengthFieldArg> for LengthField {
    fn from(value: LengthFieldArg) -> Self {
        match value {
            LengthFieldArg::U64le => LengthField::U64Le,
            LengthFieldArg::U32le => LengthField::U32Le,
            LengthFieldArg::Native => LengthField::Native,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DecodeFormat {
    Text,
    Jsonl,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Convert a text file into a length-indicated record file",
        after_help = r#"EXAMPLES
  $ lenrec encode in.csv out.bin
  $ lenrec encode in.csv out.bin --length-field u32le --sync

The output is written to a temporary file and renamed into place, so a failed
run never leaves a partial output behind."#
    )]
    Encode {
        #[arg(help = "Text input; one record per line", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(help = "Record file to create or overwrite", value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[arg(long, value_enum, default_value = "u64le", help = "Length field layout")]
        length_field: LengthFieldArg,
        #[arg(long, help = "fsync the output before renaming it into place")]
        sync: bool,
    },
    #[command(about = "Print every record of a length-indicated file")]
    Decode {
        #[arg(help = "Record file to read", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(long, value_enum, default_value = "u64le", help = "Length field layout")]
        length_field: LengthFieldArg,
        #[arg(
            long,
            default_value_t = MAX_RECORD_ABS,
            help = "Reject length fields larger than this many bytes"
        )]
        max_record_bytes: u64,
        #[arg(
            long,
            value_enum,
            default_value = "text",
            help = "Output format: text (one record per line) or jsonl"
        )]
        format: DecodeFormat,
    },
    #[command(about = "Check that a length-indicated file is complete and well-formed")]
    Verify {
        #[arg(help = "Record file to check", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(long, value_enum, default_value = "u64le", help = "Length field layout")]
        length_field: LengthFieldArg,
        #[arg(
            long,
            default_value_t = MAX_RECORD_ABS,
            help = "Reject length fields larger than this many bytes"
        )]
        max_record_bytes: u64,
        #[arg(long, help = "Emit the report as JSON")]
        json: bool,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn encode_options(length_field: LengthFieldArg, sync: bool) -> EncodeOptions {
    let durability = if sync {
        Durability::Flush
    } else {
        Durability::Fast
    };
    EncodeOptions::new(length_field.into()).with_durability(durability)
}

fn decode_options(length_field: LengthFieldArg, max_record_bytes: u64) -> DecodeOptions {
    DecodeOptions::new(length_field.into()).with_max_record_len(max_record_bytes)
}

fn verify_exit_code(report: &VerifyReport) -> i32 {
    match report.status {
        VerifyStatus::Ok => 0,
        VerifyStatus::Truncated => to_exit_code(ErrorKind::Truncated),
        VerifyStatus::Corrupt => to_exit_code(ErrorKind::Corrupt),
    }
}

fn verify_text(report: &VerifyReport) -> String {
    let label = report.path.display();
    match report.status {
        VerifyStatus::Ok => format!(
            "OK: {label} records={} payload_bytes={}",
            report.records, report.payload_bytes
        ),
        VerifyStatus::Truncated | VerifyStatus::Corrupt => {
            let status = if report.status == VerifyStatus::Truncated {
                "TRUNCATED"
            } else {
                "CORRUPT"
            };
            let detail = report
                .issue
                .as_ref()
                .map(|issue| format!(": {}", issue.message))
                .unwrap_or_default();
            format!(
                "{status}: {label} records={} last_good_offset={}{detail}",
                report.records, report.last_good_offset
            )
        }
    }
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Truncated => "truncated record".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(seq) = err.seq() {
        inner.insert("seq".to_string(), json!(seq));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(seq) = err.seq() {
        lines.push(format!(
            "{} {seq}",
            colorize_label("record:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!(
            "{} {offset}",
            colorize_label("offset:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::NotFound => err.with_hint("Check that the path exists."),
        ErrorKind::Permission => {
            err.with_hint("Permission denied. Check file and directory permissions.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and disk space."),
        _ => err,
    }
}

fn add_format_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Truncated => err.with_hint(
            "The file ends mid-record. Run `lenrec verify` to find the last good offset.",
        ),
        ErrorKind::Corrupt => err.with_hint(
            "The file does not match the expected layout. Check --length-field or re-encode it.",
        ),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `lenrec --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "lenrec") else {
        return "Try `lenrec --help`.".to_string();
    };

    let mut parts = Vec::new();
    for token in tokens.iter().skip(pos + 1) {
        if token.starts_with('-') || token.starts_with('<') || token.starts_with('[') {
            break;
        }
        parts.push(*token);
    }

    if parts.is_empty() {
        return "Try `lenrec --help`.".to_string();
    }
    format!("Try `lenrec {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, LengthFieldArg, add_format_hint, add_io_hint, error_json, error_text, verify_exit_code,
        verify_text,
    };
    use clap::Parser;
    use lenrec::{Error, ErrorKind, LengthField, VerifyIssue, VerifyReport, VerifyStatus};
    use std::path::PathBuf;

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error:"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn error_json_carries_record_context() {
        let err = Error::new(ErrorKind::Truncated)
            .with_message("payload has 2 of 9 declared bytes")
            .with_path("/tmp/x.bin")
            .with_seq(4)
            .with_offset(120);
        let value = error_json(&err);
        let inner = value.get("error").expect("error object");
        assert_eq!(inner["kind"], "Truncated");
        assert_eq!(inner["seq"], 4);
        assert_eq!(inner["offset"], 120);
        assert_eq!(inner["path"], "/tmp/x.bin");
    }

    #[test]
    fn hints_are_added_once() {
        let err = add_format_hint(Error::new(ErrorKind::Truncated));
        assert!(err.hint().unwrap_or_default().contains("lenrec verify"));

        let err = add_io_hint(Error::new(ErrorKind::Io).with_hint("keep me"));
        assert_eq!(err.hint(), Some("keep me"));
    }

    #[test]
    fn length_field_flag_maps_to_layout() {
        assert_eq!(LengthField::from(LengthFieldArg::U64le), LengthField::U64Le);
        assert_eq!(LengthField::from(LengthFieldArg::U32le), LengthField::U32Le);
        assert_eq!(LengthField::from(LengthFieldArg::Native), LengthField::Native);
    }

    #[test]
    fn cli_parses_encode_flags() {
        let cli = Cli::try_parse_from([
            "lenrec",
            "encode",
            "in.csv",
            "out.bin",
            "--length-field",
            "u32le",
            "--sync",
        ])
        .expect("parse");
        match cli.command {
            super::Command::Encode {
                input,
                output,
                length_field,
                sync,
            } => {
                assert_eq!(input, PathBuf::from("in.csv"));
                assert_eq!(output, PathBuf::from("out.bin"));
                assert_eq!(length_field, LengthFieldArg::U32le);
                assert!(sync);
            }
            _ => panic!("expected encode"),
        }
    }

    #[test]
    fn verify_report_renders_and_maps_exit_codes() {
        let report = VerifyReport {
            path: PathBuf::from("cut.bin"),
            status: VerifyStatus::Truncated,
            records: 2,
            payload_bytes: 10,
            last_good_offset: 26,
            issue: Some(VerifyIssue {
                message: "payload has 1 of 4 declared bytes".to_string(),
                seq: Some(2),
                offset: Some(26),
            }),
        };
        assert_eq!(
            verify_text(&report),
            "TRUNCATED: cut.bin records=2 last_good_offset=26: payload has 1 of 4 declared bytes"
        );
        assert_eq!(verify_exit_code(&report), 9);
    }
}
