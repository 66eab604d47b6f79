use std::sync::Arc;

use parking_lot::Mutex;
use reflex_broker::{InputBroker, OutputBroker};
use reflex_error::Result;
use reflex_gam::{CycleContext, Gam, GamScratch};
use reflex_memory::TimingDataSource;
use reflex_timer::ticks;

/// A module instance together with its scratch.
///
/// One unit exists per configured module; the states referencing it share
/// the instance, so module-internal state survives state changes. Only one
/// state runs at a time and a module may appear in at most one thread of a
/// state, so the mutex is uncontended on the real-time path.
pub struct GamUnit {
    pub name: String,
    pub gam: Box<dyn Gam>,
    pub scratch: GamScratch,
    pub fatal_on_error: bool,
}

/// Shared handle to a module instance, passed to every pipeline that
/// schedules it.
pub type SharedGamUnit = Arc<Mutex<GamUnit>>;

impl GamUnit {
    pub fn new(name: String, gam: Box<dyn Gam>, scratch: GamScratch) -> SharedGamUnit {
        let fatal_on_error = gam.fatal_on_error();
        Arc::new(Mutex::new(GamUnit {
            name,
            gam,
            scratch,
            fatal_on_error,
        }))
    }
}

/// One pass of one module in one thread: input brokers, execute, output
/// brokers.
#[derive(Clone)]
pub struct Pipeline {
    gam_name: String,
    unit: SharedGamUnit,
    input_brokers: Vec<InputBroker>,
    output_brokers: Vec<OutputBroker>,
    exec_time_index: Option<usize>,
    fatal_on_error: bool,
}

impl Pipeline {
    pub fn new(
        unit: SharedGamUnit,
        input_brokers: Vec<InputBroker>,
        output_brokers: Vec<OutputBroker>,
        exec_time_index: Option<usize>,
    ) -> Self {
        let (gam_name, fatal_on_error) = {
            let guard = unit.lock();
            (guard.name.clone(), guard.fatal_on_error)
        };
        Pipeline {
            gam_name,
            unit,
            input_brokers,
            output_brokers,
            exec_time_index,
            fatal_on_error,
        }
    }

    pub fn gam_name(&self) -> &str {
        &self.gam_name
    }

    pub fn fatal_on_error(&self) -> bool {
        self.fatal_on_error
    }

    /// Runs one cycle of this pipeline on bank `bank`.
    pub(crate) fn execute_cycle(
        &self,
        bank: usize,
        cycle: u64,
        timing: &TimingDataSource,
    ) -> Result<()> {
        let mut guard = self.unit.lock();
        for broker in &self.input_brokers {
            broker.execute(bank);
        }
        let started = ticks();
        let GamUnit { gam, scratch, .. } = &mut *guard;
        let mut ctx = CycleContext::new(scratch, cycle);
        let result = gam.execute(&mut ctx);
        if let Some(index) = self.exec_time_index {
            timing.write_u64(bank, index, ticks().saturating_sub(started));
        }
        result?;
        for broker in &self.output_brokers {
            broker.execute(bank);
        }
        Ok(())
    }
}

/// The ordered pipelines of one declared real-time thread.
#[derive(Clone)]
pub struct ThreadSchedule {
    pub name: String,
    pub cpu_mask: Option<u64>,
    pub pipelines: Vec<Pipeline>,
}

/// Everything one state executes.
#[derive(Clone)]
pub struct StateRecord {
    pub name: String,
    pub threads: Vec<ThreadSchedule>,
}
