//! Log record format selection.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How `ottercat` renders log records on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per record.
    Json,
    /// Terse single-line text, the default for interactive use.
    #[default]
    Compact,
}

/// Returned when a `--log-format` value names no known format.
pub type LogFormatParseError = strum::ParseError;
