use reflex_error::{Error, Result};
use reflex_signal::SignalRegistry;

use crate::arena::MemoryArena;

/// Names of the outgoing and incoming states of a transition.
#[derive(Debug, Clone, Copy)]
pub struct StateChangeInfo<'a> {
    /// `None` before the first state is started.
    pub current: Option<&'a str>,
    pub next: &'a str,
}

/// Capability set of a DataSource: allocated double-buffered storage,
/// signal lookup, and state-change preparation.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn registry(&self) -> &SignalRegistry;

    fn arena(&self) -> &MemoryArena;

    /// Validates a transition and pre-applies default values to the bank
    /// that is inactive at call time.
    fn prepare_next_state(&self, info: &StateChangeInfo<'_>) -> Result<()>;

    /// Writes the default values owed to `state` into `bank`. Called by
    /// the scheduler at the swap boundary, when no real-time thread runs,
    /// so the bank entered by the new state's first cycle is deterministic.
    fn apply_state_defaults(&self, state: &str, bank: usize) -> Result<()>;
}

/// The standard signal-exchange DataSource.
pub struct GamDataSource {
    name: String,
    registry: SignalRegistry,
    arena: MemoryArena,
}

impl GamDataSource {
    /// Allocates the arena for a frozen registry.
    pub fn allocate(registry: SignalRegistry) -> Self {
        let arena = MemoryArena::allocate(&registry);
        GamDataSource {
            name: registry.datasource_name().to_owned(),
            registry,
            arena,
        }
    }

    /// Signals owed a default on entry to `state`: consumed there without
    /// a producer there. Resolution guarantees each carries a default.
    fn default_indices(&self, state: &str) -> impl Iterator<Item = usize> + '_ {
        let state = state.to_owned();
        self.registry
            .iter()
            .enumerate()
            .filter(move |(_, signal)| {
                signal.consumed_in(&state)
                    && !signal.produced_in(&state)
                    && signal.default_value.is_some()
            })
            .map(|(idx, _)| idx)
    }
}

impl DataSource for GamDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn registry(&self) -> &SignalRegistry {
        &self.registry
    }

    fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    fn prepare_next_state(&self, info: &StateChangeInfo<'_>) -> Result<()> {
        let inactive = 1 - self.arena.active_buffer();
        self.apply_state_defaults(info.next, inactive)
    }

    fn apply_state_defaults(&self, state: &str, bank: usize) -> Result<()> {
        for idx in self.default_indices(state).collect::<Vec<_>>() {
            let signal = self.registry.signal(idx).expect("index from enumerate");
            let bytes = signal
                .default_value
                .as_ref()
                .expect("filtered on default presence");
            self.arena.write_signal(bank, idx, bytes).map_err(|_| {
                Error::fatal("default value length disagrees with allocated signal size")
            })?;
        }
        Ok(())
    }
}
