use reflex_config::Node;
use reflex_error::{Error, Result};

use crate::{CycleContext, Gam, SetupContext, SignalSlot};

/// Multiplies its first input (float64) by a constant gain into its first
/// output (float64). `Gain` defaults to 1.0.
pub struct GainGam {
    gain: f64,
    input: Option<SignalSlot<f64>>,
    output: Option<SignalSlot<f64>>,
}

pub(crate) fn build(parameters: &Node) -> Result<Box<dyn Gam>> {
    let gain = parameters.get_f64("Gain").unwrap_or(1.0);
    Ok(Box::new(GainGam {
        gain,
        input: None,
        output: None,
    }))
}

impl Gam for GainGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        let input = ctx.input_slot_at::<f64>(0)?;
        let output = ctx.output_slot_at::<f64>(0)?;
        if ctx.raw_input_at(0)?.byte_len() != ctx.raw_output_at(0)?.byte_len() {
            return Err(Error::parameters(format!(
                "module {}: input and output geometries differ",
                ctx.gam_name()
            )));
        }
        self.input = Some(input);
        self.output = Some(output);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        let input = self.input.expect("setup resolved the input");
        let output = self.output.expect("setup resolved the output");
        let gain = self.gain;
        for i in 0..ctx.read(input).len() {
            let value = ctx.read(input)[i] * gain;
            ctx.write(output)[i] = value;
        }
        Ok(())
    }
}
