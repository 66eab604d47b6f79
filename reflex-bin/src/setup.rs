use std::path::{Path, PathBuf};

use reflex_config::Node;
use reflex_logger_service::{Config as LoggerConfig, LoggerInitGuard};

use crate::ExitCode;

/// Reads and parses an application configuration file.
pub fn load_config(path: &Path) -> Result<Node, ExitCode> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        eprintln!("cannot read {}: {err}", path.display());
        ExitCode::Io
    })?;
    reflex_config::parse(&text).map_err(|err| {
        eprintln!("cannot parse {}: {err}", path.display());
        ExitCode::Config
    })
}

/// Starts the logger service from the optional `Logger` section.
pub fn init_logger(config: &Node) -> Result<LoggerInitGuard, ExitCode> {
    let mut logger_config = LoggerConfig::default();
    if let Some(section) = config.node("Logger") {
        if let Some(filter) = section.get_str("Filter") {
            logger_config.filter = Some(filter.to_owned());
        }
        if let Some(file) = section.get_str("File") {
            logger_config.log_to_file = true;
            logger_config.file = PathBuf::from(file);
        }
        if let Some(dir) = section.get_str("LogDir") {
            logger_config.log_dir = PathBuf::from(dir);
        }
        if let Some(pool_size) = section.get_u32("PoolSize") {
            logger_config.pool_size = pool_size as usize;
        }
    }
    reflex_logger_service::init(logger_config).map_err(|err| {
        eprintln!("cannot initialise the logger service: {err}");
        ExitCode::Failure
    })
}
