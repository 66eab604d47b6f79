use reflex_config::Node;
use reflex_error::Result;

use crate::{CycleContext, Gam, SetupContext, SignalSlot};

/// Fills its first output signal (uint32) with the running cycle number.
#[derive(Default)]
pub struct CounterGam {
    output: Option<SignalSlot<u32>>,
}

pub(crate) fn build(_parameters: &Node) -> Result<Box<dyn Gam>> {
    Ok(Box::new(CounterGam::default()))
}

impl Gam for CounterGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.output = Some(ctx.output_slot_at::<u32>(0)?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        let slot = self.output.expect("setup resolved the output");
        let cycle = ctx.cycle() as u32;
        ctx.write(slot).fill(cycle);
        Ok(())
    }
}
