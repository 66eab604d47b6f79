//! The logging facade used over the whole framework.
//!
//! This crate only fronts the `log` facade; the implementation lives in
//! `reflex-logger-service`. Crates log through this one name so the backing
//! service can be swapped without touching call sites.

pub use log::{
    self, debug, error, info, log_enabled, trace, warn, Level, LevelFilter, Metadata, Record,
};
