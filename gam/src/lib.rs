//! The module contract.
//!
//! A GAM is a function object with fixed input and output signal sets.
//! The framework allocates its scratch (one aligned slot per signal with a
//! stable offset, so brokers can precompute copy tables), calls
//! [`Gam::setup`] once after resolution, and [`Gam::execute`] once per
//! cycle. Modules read and write only their scratch; DataSource memory is
//! reached exclusively through brokers.

mod context;
mod factory;
pub mod gams;
mod scratch;

pub use context::{CycleContext, RawSlot, SetupContext, SignalSlot};
pub use factory::{GamBuilder, GamFactory};
pub use scratch::{GamScratch, ScratchSlot};

use reflex_error::Result;
use reflex_signal::SignalType;

/// A processing module, stateless per cycle.
pub trait Gam: Send {
    /// Called once, after resolution and scratch allocation. Modules
    /// resolve their typed signal slots here.
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()>;

    /// Called once per cycle between the input and output brokers.
    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()>;

    /// When true, an execute error triggers the error-state transition
    /// instead of being counted and skipped.
    fn fatal_on_error(&self) -> bool {
        false
    }
}

/// Rust-native element types of primitive signals.
pub trait SignalNative: Copy + Default + Send + 'static {
    const SIGNAL_TYPE: SignalType;
}

macro_rules! impl_signal_native {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(impl SignalNative for $native {
            const SIGNAL_TYPE: SignalType = SignalType::$variant;
        })*
    };
}

impl_signal_native! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}
