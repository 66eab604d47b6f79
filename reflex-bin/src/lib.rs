//! reflex executable.

mod cli;
mod setup;

use std::path::PathBuf;

use clap::ArgMatches;
use reflex_app::{ApplicationOptions, RealTimeApplication};
use reflex_gam::gams::register_builtin_gams;
use reflex_gam::GamFactory;
use reflex_logger::info;
use reflex_message::MessageHub;
use reflex_signal::{resolve, TypeRegistry};
use reflex_stop_handler::{broadcast_exit_signals, new_crossbeam_exit_rx};

/// Process exit classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Generic runtime failure.
    Failure,
    /// The configuration is invalid.
    Config,
    /// A file could not be read.
    Io,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        match code {
            ExitCode::Failure => 1,
            ExitCode::Config => 2,
            ExitCode::Io => 3,
        }
    }
}

/// The executable main entry.
pub fn run_app() -> Result<(), ExitCode> {
    let matches = cli::basic_app()
        .version(env!("CARGO_PKG_VERSION"))
        .get_matches();
    match matches.subcommand() {
        Some((cli::CMD_RUN, sub)) => run(sub),
        Some((cli::CMD_CHECK, sub)) => check(sub),
        _ => unreachable!("subcommands are required"),
    }
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>(cli::ARG_CONFIG)
        .map(PathBuf::from)
        .expect("the config argument is required")
}

fn run(matches: &ArgMatches) -> Result<(), ExitCode> {
    let path = config_path(matches);
    let config = setup::load_config(&path)?;
    let _logger_guard = setup::init_logger(&config)?;
    reflex_timer::calibrate();

    let mut factory = GamFactory::new();
    register_builtin_gams(&mut factory).expect("builtin module classes are distinct");

    let application = RealTimeApplication::build(
        &config,
        &factory,
        MessageHub::new(),
        ApplicationOptions::default(),
    )
    .map_err(|err| {
        eprintln!("cannot build the application: {err}");
        ExitCode::Config
    })?;

    application.start().map_err(|err| {
        eprintln!("cannot start state {}: {err}", application.initial_state());
        ExitCode::Failure
    })?;
    info!(
        "application running in state {}, Ctrl-C to stop",
        application.initial_state()
    );

    let exit_rx = new_crossbeam_exit_rx();
    ctrlc::set_handler(broadcast_exit_signals).expect("install the Ctrl-C handler");
    let _ = exit_rx.recv();

    info!("shutting down");
    application.shutdown();
    reflex_stop_handler::wait_all_threads_stopped();
    Ok(())
}

fn check(matches: &ArgMatches) -> Result<(), ExitCode> {
    let path = config_path(matches);
    let config = setup::load_config(&path)?;
    let resolved = resolve(&config, &TypeRegistry::new()).map_err(|err| {
        eprintln!("configuration is inconsistent: {err}");
        ExitCode::Config
    })?;

    println!(
        "{}: {} modules, {} datasources, {} states",
        path.display(),
        resolved.functions.len(),
        resolved.datasources.len(),
        resolved.states.len()
    );
    for datasource in &resolved.datasources {
        println!(
            "  {} ({} signals, {} bytes per bank)",
            datasource.name,
            datasource.registry.len(),
            datasource.registry.total_byte_size()
        );
        for signal in datasource.registry.iter() {
            println!(
                "    {} {} x{} ({} bytes)",
                signal.name,
                signal.signal_type,
                signal.total_elements(),
                signal.byte_size
            );
        }
    }
    for state in &resolved.states {
        let threads: Vec<&str> = state.threads.iter().map(|t| t.name.as_str()).collect();
        println!("  state {} (threads: {})", state.name, threads.join(", "));
    }
    Ok(())
}
