//! Library modules shipped with the framework.

mod counter;
mod gain;
mod io;

pub use counter::CounterGam;
pub use gain::GainGam;
pub use io::IoGam;

use reflex_error::Result;

use crate::GamFactory;

/// Registers the library modules on a factory.
pub fn register_builtin_gams(factory: &mut GamFactory) -> Result<()> {
    factory.register("CounterGam", counter::build)?;
    factory.register("GainGam", gain::build)?;
    factory.register("IoGam", io::build)?;
    Ok(())
}
