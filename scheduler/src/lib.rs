//! State-aware real-time scheduler.
//!
//! Every configured state owns a record: its threads, each with an ordered
//! list of pipelines `(input brokers, module, output brokers)`. The
//! scheduler runs one OS worker thread per declared thread of the active
//! state. A state change is cooperative: `prepare_next_state` stages the
//! record off the real-time path, `start_next_state_execution` lets the
//! running workers finish their cycle, the last one out performs the
//! single atomic swap of the active slot, and the staged state's workers
//! take over.

mod affinity;
mod cycle;
mod record;
mod scheduler;

pub use cycle::CycleEvent;
pub use record::{GamUnit, Pipeline, SharedGamUnit, StateRecord, ThreadSchedule};
pub use scheduler::{ExecFailure, Scheduler, SchedulerOptions};
