//! Hierarchical configuration database.
//!
//! The text format is sections delimited by `{ }` with `key = value` pairs,
//! nested arbitrarily:
//!
//! ```text
//! Functions = {
//!     GainGam = {
//!         Class = GainGam
//!         Gain = 2.0
//!         InputSignals = { sigX = { DataSource = DDB1 Type = int32 } }
//!     }
//! }
//! ```
//!
//! Parsing produces a [`Node`] tree whose children preserve insertion
//! order; serializing a tree back yields text the parser accepts again.

mod parser;
mod value;
mod writer;

pub use parser::parse;
pub use value::{Node, Value};
pub use writer::to_text;
