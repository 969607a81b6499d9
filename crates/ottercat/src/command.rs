//! Command stream parsing and result rendering.
//!
//! Each non-blank input line is one command. A line holding a JSON object
//! `{"type": <string>, "data": <string>}` is an enveloped request: `data` is
//! sent to the daemon and the result is wrapped back into an envelope of the
//! same type. Any other line is sent verbatim and its result printed as-is.

use serde::Deserialize;
use serde_json::Value;

const PROGRAM_NAME: &str = "ottercat";

#[derive(Debug, Deserialize)]
struct EnvelopedRequest {
    #[serde(rename = "type")]
    kind: Value,
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandLine<'a> {
    /// Sent and printed verbatim.
    Raw(&'a str),
    /// `data` is sent; the result is wrapped in a `kind` envelope.
    Enveloped { kind: String, data: String },
    /// A JSON object that is not a well-formed envelope; skipped.
    Unsupported,
}

impl<'a> CommandLine<'a> {
    pub(crate) fn parse(line: &'a str) -> Self {
        if !line.starts_with('{') {
            return Self::Raw(line);
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => {
                match serde_json::from_value::<EnvelopedRequest>(Value::Object(object)) {
                    Ok(EnvelopedRequest {
                        kind: Value::String(kind),
                        data: Value::String(data),
                    }) => Self::Enveloped { kind, data },
                    _ => Self::Unsupported,
                }
            }
            _ => Self::Raw(line),
        }
    }

    /// Bytes written to the daemon, or `None` when the line is skipped.
    pub(crate) fn request(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(line) => Some(line.as_bytes()),
            Self::Enveloped { data, .. } => Some(data.as_bytes()),
            Self::Unsupported => None,
        }
    }

    /// Output line for a successful result, or `None` for an empty result.
    pub(crate) fn render(&self, result: &str) -> Option<String> {
        if result.is_empty() {
            return None;
        }
        match self {
            Self::Raw(_) | Self::Unsupported => Some(result.to_owned()),
            Self::Enveloped { kind, .. } => {
                let data = serde_json::from_str::<Value>(result)
                    .unwrap_or_else(|_| Value::String(result.to_owned()));
                Some(format!(
                    r#"{{"type":{},"data":{data}}}"#,
                    Value::String(kind.clone())
                ))
            }
        }
    }
}

/// Error record written to stdout when a command fails.
pub(crate) fn error_record(code: i64, description: &str) -> String {
    format!(
        r#"{{"cmd":"{PROGRAM_NAME}","err":{code},"desc":{}}}"#,
        Value::String(description.to_owned())
    )
}

/// Splits a command stream into trimmed, non-blank command lines.
pub(crate) fn command_lines(stream: &str) -> impl Iterator<Item = &str> {
    stream
        .split(['\n', '\0'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("version", CommandLine::Raw("version"))]
    #[case(
        r#"{"type":"dev","data":"tx 01"}"#,
        CommandLine::Enveloped { kind: String::from("dev"), data: String::from("tx 01") }
    )]
    #[case(r#"{"type":"dev","data":5}"#, CommandLine::Unsupported)]
    #[case(r#"{"data":"tx"}"#, CommandLine::Unsupported)]
    #[case("{not json", CommandLine::Raw("{not json"))]
    fn parses_command_lines(#[case] line: &str, #[case] expected: CommandLine<'_>) {
        assert_eq!(CommandLine::parse(line), expected);
    }

    #[rstest]
    fn enveloped_results_are_wrapped() {
        let command = CommandLine::parse(r#"{"type":"dev","data":"rx"}"#);
        assert_eq!(
            command.render("AB12").as_deref(),
            Some(r#"{"type":"dev","data":"AB12"}"#)
        );
        assert_eq!(
            command.render(r#"{"rssi":-70}"#).as_deref(),
            Some(r#"{"type":"dev","data":{"rssi":-70}}"#)
        );
        assert_eq!(command.render(""), None);
    }

    #[rstest]
    fn command_stream_skips_blank_lines() {
        let lines: Vec<&str> = command_lines("  ping\n\n\t tx 01 \0version\n").collect();
        assert_eq!(lines, vec!["ping", "tx 01", "version"]);
    }

    #[rstest]
    fn error_record_escapes_description() {
        assert_eq!(
            error_record(-4, r#"no "reply""#),
            r#"{"cmd":"ottercat","err":-4,"desc":"no \"reply\""}"#
        );
    }
}
