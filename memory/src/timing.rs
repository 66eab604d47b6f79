use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;
use reflex_error::Result;
use reflex_signal::{SignalDescriptor, SignalRegistry, SignalType};

use crate::arena::MemoryArena;
use crate::datasource::{DataSource, StateChangeInfo};

/// Framework-produced per-cycle diagnostics.
///
/// The signal set is generated from the configured thread and module
/// names: per thread `<name>_CycleTime` (ticks) and `<name>_CycleCount`,
/// per module `<name>_ExecTime` (ticks), plus the global `StateTransitions`
/// and `ExecErrors` counters. The scheduler is the producer of all of
/// them; anything may consume them through the registry.
pub struct TimingDataSource {
    name: String,
    registry: SignalRegistry,
    arena: MemoryArena,
    cycle_time: HashMap<String, usize>,
    cycle_count: HashMap<String, usize>,
    exec_time: HashMap<String, usize>,
    state_transitions: usize,
    exec_errors: usize,
}

fn counter_descriptor(datasource: &str, name: String) -> SignalDescriptor {
    SignalDescriptor {
        qualified_name: format!("{datasource}.{name}"),
        name,
        signal_type: SignalType::Uint64,
        num_dimensions: 0,
        num_elements: [1, 1, 1],
        num_samples: 1,
        byte_size: 8,
        default_literal: None,
        default_value: None,
        states: LinkedHashMap::new(),
    }
}

impl TimingDataSource {
    pub fn build(name: &str, thread_names: &[String], gam_names: &[String]) -> Self {
        let mut signals = Vec::new();
        let mut cycle_time = HashMap::new();
        let mut cycle_count = HashMap::new();
        let mut exec_time = HashMap::new();
        for thread in thread_names {
            cycle_time.insert(thread.clone(), signals.len());
            signals.push(counter_descriptor(name, format!("{thread}_CycleTime")));
            cycle_count.insert(thread.clone(), signals.len());
            signals.push(counter_descriptor(name, format!("{thread}_CycleCount")));
        }
        for gam in gam_names {
            exec_time.insert(gam.clone(), signals.len());
            signals.push(counter_descriptor(name, format!("{gam}_ExecTime")));
        }
        let state_transitions = signals.len();
        signals.push(counter_descriptor(name, "StateTransitions".to_owned()));
        let exec_errors = signals.len();
        signals.push(counter_descriptor(name, "ExecErrors".to_owned()));

        let registry = SignalRegistry::new(name.to_owned(), signals);
        let arena = MemoryArena::allocate(&registry);
        TimingDataSource {
            name: name.to_owned(),
            registry,
            arena,
            cycle_time,
            cycle_count,
            exec_time,
            state_transitions,
            exec_errors,
        }
    }

    pub fn cycle_time_index(&self, thread: &str) -> Option<usize> {
        self.cycle_time.get(thread).copied()
    }

    pub fn cycle_count_index(&self, thread: &str) -> Option<usize> {
        self.cycle_count.get(thread).copied()
    }

    pub fn exec_time_index(&self, gam: &str) -> Option<usize> {
        self.exec_time.get(gam).copied()
    }

    pub fn state_transitions_index(&self) -> usize {
        self.state_transitions
    }

    pub fn exec_errors_index(&self) -> usize {
        self.exec_errors
    }

    /// Reads a counter from one bank.
    pub fn read_u64(&self, bank: usize, index: usize) -> u64 {
        let mut bytes = [0u8; 8];
        if self.arena.read_signal(bank, index, &mut bytes).is_ok() {
            u64::from_le_bytes(bytes)
        } else {
            0
        }
    }

    /// Overwrites a counter in one bank. Single-writer: the scheduler.
    pub fn write_u64(&self, bank: usize, index: usize, value: u64) {
        let _ = self.arena.write_signal(bank, index, &value.to_le_bytes());
    }

    /// Adds to a counter in both banks, so readers observe it regardless
    /// of the cycle parity.
    pub fn bump_u64(&self, index: usize, delta: u64) {
        for bank in 0..2 {
            let value = self.read_u64(bank, index);
            self.write_u64(bank, index, value + delta);
        }
    }
}

impl DataSource for TimingDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn registry(&self) -> &SignalRegistry {
        &self.registry
    }

    fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    fn prepare_next_state(&self, _info: &StateChangeInfo<'_>) -> Result<()> {
        Ok(())
    }

    fn apply_state_defaults(&self, _state: &str, _bank: usize) -> Result<()> {
        self.bump_u64(self.state_transitions, 1);
        Ok(())
    }
}
