//! Signal descriptors, per-state usage records and configuration resolution.
//!
//! Resolution walks the `Functions`, `Data` and `States` sections of the
//! configuration tree, matches every module signal declaration against its
//! DataSource (auto-creating entries the DataSource did not declare), runs
//! the consistency checks, and freezes one [`SignalRegistry`] per
//! DataSource. After resolution every signal query is an index lookup.

mod descriptor;
mod registry;
mod resolve;
mod types;

pub use descriptor::{SignalDescriptor, SignalUsage};
pub use registry::SignalRegistry;
pub use resolve::{
    resolve, DataSourceClass, DataSourceDeclaration, GamDeclaration, ResolvedApplication,
    SchedulerDeclaration, SignalBinding, StateDeclaration, ThreadDeclaration,
};
pub use types::{SignalType, TypeRegistry};
