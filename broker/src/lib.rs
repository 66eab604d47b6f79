//! Precomputed copy plans between module scratch and DataSource banks.
//!
//! A broker is built once per module and direction: one entry per signal,
//! with the scratch address and both per-bank DataSource addresses
//! resolved up front. Executing a broker is a bare loop of `memcpy`s: no
//! allocation, no lookup, no branching beyond the loop bound. Multi-sample
//! signals are laid out contiguously, so they cost a single entry.

use reflex_error::{Error, Result};
use reflex_gam::GamScratch;
use reflex_memory::DataSource;
use reflex_signal::SignalBinding;

#[derive(Clone, Copy)]
struct CopyEntry {
    gam_ptr: *mut u8,
    ds_ptr: [*mut u8; 2],
    size: usize,
}

#[derive(Clone)]
struct CopyTable {
    entries: Vec<CopyEntry>,
    byte_count: usize,
}

// Entries hold raw addresses into the module scratch and the DataSource
// arena. Both allocations are owned by the application for longer than any
// scheduled state. The table itself is immutable after build; every
// execute call of one cycle runs on the worker thread that owns the
// module, so the pointed-to memory has a single writer at any time.
unsafe impl Send for CopyTable {}
unsafe impl Sync for CopyTable {}

fn build_table(
    scratch: &GamScratch,
    slots_are_inputs: bool,
    bindings: &[SignalBinding],
    positions: Option<&[usize]>,
    datasource: &dyn DataSource,
) -> Result<CopyTable> {
    let slots = if slots_are_inputs {
        scratch.input_slots()
    } else {
        scratch.output_slots()
    };
    if slots.len() != bindings.len() {
        return Err(Error::initialisation(
            "scratch layout and signal bindings disagree",
        ));
    }
    let all_positions: Vec<usize>;
    let positions = match positions {
        Some(positions) => positions,
        None => {
            all_positions = (0..bindings.len()).collect();
            &all_positions
        }
    };
    let arena = datasource.arena();
    let mut entries = Vec::with_capacity(positions.len());
    let mut byte_count = 0usize;
    for &position in positions {
        let (slot, binding) = slots
            .get(position)
            .zip(bindings.get(position))
            .ok_or_else(|| Error::initialisation("broker position out of range"))?;
        let size = binding.byte_size as usize;
        if slot.byte_size != size || arena.signal_size(binding.signal_index) != Some(size) {
            return Err(Error::initialisation(format!(
                "signal {} allocation disagrees with its resolved byte size",
                binding.signal_name
            )));
        }
        let ds_ptr = [
            arena
                .signal_ptr(0, binding.signal_index)
                .ok_or_else(|| Error::initialisation("signal index out of arena range"))?,
            arena
                .signal_ptr(1, binding.signal_index)
                .ok_or_else(|| Error::initialisation("signal index out of arena range"))?,
        ];
        entries.push(CopyEntry {
            gam_ptr: scratch.slot_ptr(slot),
            ds_ptr,
            size,
        });
        byte_count += size;
    }
    Ok(CopyTable {
        entries,
        byte_count,
    })
}

/// Copies DataSource bank → module scratch, one entry per input signal.
#[derive(Clone)]
pub struct InputBroker {
    table: CopyTable,
}

impl InputBroker {
    /// Builds the copy table for a module's whole input set. `bindings`
    /// must be the resolved inputs the scratch was laid out from, in
    /// order, all backed by `datasource`.
    pub fn build(
        scratch: &GamScratch,
        bindings: &[SignalBinding],
        datasource: &dyn DataSource,
    ) -> Result<Self> {
        Ok(InputBroker {
            table: build_table(scratch, true, bindings, None, datasource)?,
        })
    }

    /// Builds the copy table for the subset of inputs at `positions`, the
    /// ones backed by `datasource`. A module whose signals span several
    /// DataSources gets one broker per DataSource.
    pub fn build_for_positions(
        scratch: &GamScratch,
        bindings: &[SignalBinding],
        positions: &[usize],
        datasource: &dyn DataSource,
    ) -> Result<Self> {
        Ok(InputBroker {
            table: build_table(scratch, true, bindings, Some(positions), datasource)?,
        })
    }

    pub fn execute(&self, bank: usize) {
        debug_assert!(bank < 2);
        for entry in &self.table.entries {
            unsafe {
                std::ptr::copy_nonoverlapping(entry.ds_ptr[bank], entry.gam_ptr, entry.size);
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.table.entries.len()
    }

    pub fn byte_count(&self) -> usize {
        self.table.byte_count
    }
}

/// Copies module scratch → DataSource bank, one entry per output signal.
#[derive(Clone)]
pub struct OutputBroker {
    table: CopyTable,
}

impl OutputBroker {
    /// Builds the copy table for a module's whole output set.
    pub fn build(
        scratch: &GamScratch,
        bindings: &[SignalBinding],
        datasource: &dyn DataSource,
    ) -> Result<Self> {
        Ok(OutputBroker {
            table: build_table(scratch, false, bindings, None, datasource)?,
        })
    }

    /// Builds the copy table for the subset of outputs at `positions`.
    pub fn build_for_positions(
        scratch: &GamScratch,
        bindings: &[SignalBinding],
        positions: &[usize],
        datasource: &dyn DataSource,
    ) -> Result<Self> {
        Ok(OutputBroker {
            table: build_table(scratch, false, bindings, Some(positions), datasource)?,
        })
    }

    pub fn execute(&self, bank: usize) {
        debug_assert!(bank < 2);
        for entry in &self.table.entries {
            unsafe {
                std::ptr::copy_nonoverlapping(entry.gam_ptr, entry.ds_ptr[bank], entry.size);
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.table.entries.len()
    }

    pub fn byte_count(&self) -> usize {
        self.table.byte_count
    }
}
