//! Double-buffered DataSource memory arenas backing every signal.
//!
//! Each DataSource owns one contiguous arena holding two identical banks;
//! every signal lives at the same offset in both. Brokers copy through raw
//! pointers selected by the bank index of the cycle; the arena itself is
//! never locked. The discipline that makes this sound: the scheduler is
//! the sole mutator of the active-bank index, and all copies of one cycle
//! use a single bank index.

mod arena;
mod datasource;
mod timing;

pub use arena::MemoryArena;
pub use datasource::{DataSource, GamDataSource, StateChangeInfo};
pub use timing::TimingDataSource;
