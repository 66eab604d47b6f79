//! reflex command line arguments parser.

use clap::{Arg, Command};

/// The executable name.
pub const BIN_NAME: &str = "reflex";
/// Subcommand `run`.
pub const CMD_RUN: &str = "run";
/// Subcommand `check`.
pub const CMD_CHECK: &str = "check";
/// Command line argument `--config`.
pub const ARG_CONFIG: &str = "config";

fn config_arg() -> Arg {
    Arg::new(ARG_CONFIG)
        .short('c')
        .long(ARG_CONFIG)
        .required(true)
        .value_name("FILE")
        .help("Application configuration file")
}

pub fn basic_app() -> Command {
    Command::new(BIN_NAME)
        .about("reflex is a modular real-time application framework for feedback-control systems")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new(CMD_RUN)
                .about("Runs the application described by a configuration file")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new(CMD_CHECK)
                .about("Resolves a configuration file and reports the signal graph")
                .arg(config_arg()),
        )
}
