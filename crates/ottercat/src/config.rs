//! Configuration loading helpers for `ottercat`.
//!
//! Leading flags understood by `ortho_config` are split off before clap sees
//! the command line, so the remaining tokens can be forwarded verbatim as the
//! daemon command.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use otter_config::Config;

use crate::AppError;

/// CLI flags recognised by the configuration loader.
///
/// Kept in sync with the fields of [`otter_config::Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--socket",
    "--timeout-ms",
    "--retries",
    "--max-readers",
    "--max-subscribers",
    "--max-line-bytes",
    "--backoff-min-ms",
    "--backoff-max-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the filtered argument list.
    ///
    /// Configuration flags must precede the command; a flag appearing after
    /// the first command token is part of the command.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let mut parts = text.splitn(2, '=');
    let flag = parts.next().unwrap_or_default();
    let has_inline_value = parts.next().is_some();
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by every leading configuration flag.
    pub(crate) config_arguments: Vec<OsString>,
    /// Index of the first command token in the original arguments.
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut awaiting_value = false;
    let mut command_start = 1;
    for argument in rest {
        if awaiting_value {
            awaiting_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => awaiting_value = needs_value,
                FlagAction::Stop => break,
            }
        }
        config_arguments.push(argument.clone());
        command_start += 1;
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}
