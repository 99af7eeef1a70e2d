//! Configuration loading helpers for the CLI.
//!
//! Configuration flags precede the subcommand. The split below hands those
//! to `ortho_config` and leaves the rest for `clap`.

use std::ffi::{OsStr, OsString};

use majordomo_config::{CONFIG_CLI_FLAGS, Config};
use ortho_config::OrthoConfig;

use crate::errors::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
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
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments split into the configuration prefix and the command line.
///
/// Both halves keep the program name in first position.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut remaining = args.iter();
    let program: Vec<OsString> = remaining.next().cloned().into_iter().collect();
    let mut config_arguments = program.clone();
    let mut command_arguments = program;

    while let Some(argument) = remaining.next() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                if needs_value && let Some(value) = remaining.next() {
                    config_arguments.push(value.clone());
                }
            }
            FlagAction::Stop => {
                command_arguments.push(argument.clone());
                command_arguments.extend(remaining.by_ref().cloned());
                break;
            }
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case("--log-filter", FlagAction::Include { needs_value: true })]
    #[case("request", FlagAction::Stop)]
    #[case("--unknown", FlagAction::Stop)]
    fn classifies_flags(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[test]
    fn separates_leading_configuration_flags() {
        let split = split_config_arguments(&args(&[
            "majordomo",
            "--client-endpoint",
            "tcp://127.0.0.1:7000",
            "--log-format=compact",
            "request",
            "echo",
            "--timeout-ms",
            "10",
        ]));

        assert_eq!(
            split.config_arguments,
            args(&[
                "majordomo",
                "--client-endpoint",
                "tcp://127.0.0.1:7000",
                "--log-format=compact",
            ])
        );
        assert_eq!(
            split.command_arguments,
            args(&["majordomo", "request", "echo", "--timeout-ms", "10"])
        );
    }

    #[test]
    fn configuration_flags_after_the_subcommand_belong_to_it() {
        let split = split_config_arguments(&args(&["majordomo", "fetch", "--log-filter", "x"]));
        assert_eq!(split.config_arguments, args(&["majordomo"]));
        assert_eq!(
            split.command_arguments,
            args(&["majordomo", "fetch", "--log-filter", "x"])
        );
    }

    #[test]
    fn empty_arguments_stay_empty() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert!(split.command_arguments.is_empty());
    }
}
