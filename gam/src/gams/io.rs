use reflex_config::Node;
use reflex_error::{Error, Result};

use crate::{CycleContext, Gam, RawSlot, SetupContext};

/// Copies input signal `i` to output signal `i`, byte-wise. Input and
/// output sets must pair up in count and size.
#[derive(Default)]
pub struct IoGam {
    copies: Vec<(RawSlot, RawSlot)>,
}

pub(crate) fn build(_parameters: &Node) -> Result<Box<dyn Gam>> {
    Ok(Box::new(IoGam::default()))
}

impl Gam for IoGam {
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        if ctx.input_count() != ctx.output_count() {
            return Err(Error::parameters(format!(
                "module {}: {} inputs vs {} outputs",
                ctx.gam_name(),
                ctx.input_count(),
                ctx.output_count()
            )));
        }
        self.copies.clear();
        for index in 0..ctx.input_count() {
            let src = ctx.raw_input_at(index)?;
            let dst = ctx.raw_output_at(index)?;
            if src.byte_len() != dst.byte_len() {
                return Err(Error::parameters(format!(
                    "module {}: signal pair {index} differs in size",
                    ctx.gam_name()
                )));
            }
            self.copies.push((src, dst));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut CycleContext<'_>) -> Result<()> {
        for &(src, dst) in &self.copies {
            ctx.copy_raw(src, dst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GamScratch;
    use reflex_signal::{SignalBinding, SignalType};

    fn binding(name: &str, ty: SignalType, elements: u32) -> SignalBinding {
        SignalBinding {
            declared_name: name.into(),
            datasource: "DDB1".into(),
            datasource_index: 0,
            signal_name: name.into(),
            signal_index: 0,
            byte_size: ty.byte_size() * elements,
            signal_type: ty,
            num_elements_total: elements,
            num_samples: 1,
        }
    }

    #[test]
    fn pairs_are_copied() {
        let scratch = GamScratch::build(
            &[binding("a", SignalType::Int32, 2)],
            &[binding("b", SignalType::Int32, 2)],
        );
        let params = Node::new();
        let mut gam = IoGam::default();
        gam.setup(&mut SetupContext::new("Io1", &params, &scratch))
            .expect("setup");

        let setup = SetupContext::new("Io1", &params, &scratch);
        let input = setup.input_slot::<i32>("a").expect("slot");
        let output = setup.output_slot::<i32>("b").expect("slot");
        let mut ctx = CycleContext::new(&scratch, 0);
        ctx.write(input).copy_from_slice(&[11, -3]);
        gam.execute(&mut ctx).expect("execute");
        assert_eq!(ctx.read(output), &[11, -3]);
    }

    #[test]
    fn unbalanced_sets_fail_setup() {
        let scratch = GamScratch::build(&[binding("a", SignalType::Int32, 1)], &[]);
        let params = Node::new();
        let mut gam = IoGam::default();
        assert!(gam
            .setup(&mut SetupContext::new("Io1", &params, &scratch))
            .is_err());
    }
}
