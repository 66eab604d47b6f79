use std::marker::PhantomData;

use reflex_config::Node;
use reflex_error::{Error, Result};

use crate::scratch::{GamScratch, ScratchSlot};
use crate::SignalNative;

/// Typed handle to a scratch slot, resolved once at setup.
pub struct SignalSlot<T> {
    offset: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for SignalSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SignalSlot<T> {}

/// Untyped handle to a scratch slot, for byte-wise modules.
#[derive(Debug, Clone, Copy)]
pub struct RawSlot {
    offset: usize,
    len: usize,
}

impl RawSlot {
    pub fn byte_len(&self) -> usize {
        self.len
    }
}

fn typed_slot<T: SignalNative>(slot: &ScratchSlot, gam: &str) -> Result<SignalSlot<T>> {
    if slot.signal_type != T::SIGNAL_TYPE {
        return Err(Error::parameters(format!(
            "module {gam}: signal {} is {} in the configuration, requested as {}",
            slot.name,
            slot.signal_type,
            T::SIGNAL_TYPE,
        )));
    }
    Ok(SignalSlot {
        offset: slot.offset,
        len: slot.elements,
        _marker: PhantomData,
    })
}

/// Setup-time view of a module: its name, parameters and scratch layout.
pub struct SetupContext<'a> {
    name: &'a str,
    parameters: &'a Node,
    scratch: &'a GamScratch,
}

impl<'a> SetupContext<'a> {
    pub fn new(name: &'a str, parameters: &'a Node, scratch: &'a GamScratch) -> Self {
        SetupContext {
            name,
            parameters,
            scratch,
        }
    }

    pub fn gam_name(&self) -> &str {
        self.name
    }

    /// The module's configuration node.
    pub fn parameters(&self) -> &Node {
        self.parameters
    }

    pub fn input_count(&self) -> usize {
        self.scratch.input_slots().len()
    }

    pub fn output_count(&self) -> usize {
        self.scratch.output_slots().len()
    }

    pub fn input_slot<T: SignalNative>(&self, name: &str) -> Result<SignalSlot<T>> {
        let slot = self.scratch.input_slot(name).ok_or_else(|| {
            Error::parameters(format!("module {}: no input signal named {name}", self.name))
        })?;
        typed_slot(slot, self.name)
    }

    pub fn output_slot<T: SignalNative>(&self, name: &str) -> Result<SignalSlot<T>> {
        let slot = self.scratch.output_slot(name).ok_or_else(|| {
            Error::parameters(format!(
                "module {}: no output signal named {name}",
                self.name
            ))
        })?;
        typed_slot(slot, self.name)
    }

    pub fn input_slot_at<T: SignalNative>(&self, index: usize) -> Result<SignalSlot<T>> {
        let slot = self.scratch.input_slots().get(index).ok_or_else(|| {
            Error::parameters(format!(
                "module {}: input index {index} out of range",
                self.name
            ))
        })?;
        typed_slot(slot, self.name)
    }

    pub fn output_slot_at<T: SignalNative>(&self, index: usize) -> Result<SignalSlot<T>> {
        let slot = self.scratch.output_slots().get(index).ok_or_else(|| {
            Error::parameters(format!(
                "module {}: output index {index} out of range",
                self.name
            ))
        })?;
        typed_slot(slot, self.name)
    }

    pub fn raw_input_at(&self, index: usize) -> Result<RawSlot> {
        let slot = self.scratch.input_slots().get(index).ok_or_else(|| {
            Error::parameters(format!(
                "module {}: input index {index} out of range",
                self.name
            ))
        })?;
        Ok(RawSlot {
            offset: slot.offset,
            len: slot.byte_size,
        })
    }

    pub fn raw_output_at(&self, index: usize) -> Result<RawSlot> {
        let slot = self.scratch.output_slots().get(index).ok_or_else(|| {
            Error::parameters(format!(
                "module {}: output index {index} out of range",
                self.name
            ))
        })?;
        Ok(RawSlot {
            offset: slot.offset,
            len: slot.byte_size,
        })
    }
}

/// Cycle-time view of a module: typed access to its scratch.
pub struct CycleContext<'a> {
    scratch: &'a GamScratch,
    cycle: u64,
}

impl<'a> CycleContext<'a> {
    pub fn new(scratch: &'a GamScratch, cycle: u64) -> Self {
        CycleContext { scratch, cycle }
    }

    /// Number of the running cycle within the current state, from zero.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn read<T: SignalNative>(&self, slot: SignalSlot<T>) -> &[T] {
        // slots are 8-byte aligned and sized by the resolved geometry
        unsafe {
            std::slice::from_raw_parts(
                self.scratch.base_ptr().add(slot.offset) as *const T,
                slot.len,
            )
        }
    }

    pub fn write<T: SignalNative>(&mut self, slot: SignalSlot<T>) -> &mut [T] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.scratch.base_ptr().add(slot.offset) as *mut T,
                slot.len,
            )
        }
    }

    /// Byte-wise copy between two slots of equal size.
    pub fn copy_raw(&mut self, src: RawSlot, dst: RawSlot) -> Result<()> {
        if src.len != dst.len {
            return Err(Error::parameters("raw slot sizes differ"));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.scratch.base_ptr().add(src.offset),
                self.scratch.base_ptr().add(dst.offset),
                src.len,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_signal::{SignalBinding, SignalType};

    fn binding(name: &str, ty: SignalType, elements: u32) -> SignalBinding {
        SignalBinding {
            declared_name: name.to_owned(),
            datasource: "DDB1".to_owned(),
            datasource_index: 0,
            signal_name: name.to_owned(),
            signal_index: 0,
            byte_size: ty.byte_size() * elements,
            signal_type: ty,
            num_elements_total: elements,
            num_samples: 1,
        }
    }

    #[test]
    fn typed_round_trip_through_scratch() {
        let scratch = GamScratch::build(
            &[binding("in", SignalType::Int32, 2)],
            &[binding("out", SignalType::Int32, 2)],
        );
        let params = Node::new();
        let setup = SetupContext::new("T", &params, &scratch);
        let input = setup.input_slot::<i32>("in").expect("input slot");
        let output = setup.output_slot::<i32>("out").expect("output slot");

        let mut ctx = CycleContext::new(&scratch, 0);
        ctx.write(output).copy_from_slice(&[7, 8]);
        ctx.write(input).copy_from_slice(&[1, 2]);
        assert_eq!(ctx.read(input), &[1, 2]);
        assert_eq!(ctx.read(output), &[7, 8]);
    }

    #[test]
    fn type_mismatch_is_rejected_at_setup() {
        let scratch = GamScratch::build(&[binding("in", SignalType::Int32, 1)], &[]);
        let params = Node::new();
        let setup = SetupContext::new("T", &params, &scratch);
        let err = setup.input_slot::<f64>("in").err().expect("type mismatch");
        assert!(err.to_string().contains("requested as float64"), "{err}");
        assert!(setup.input_slot::<i32>("missing").is_err());
    }

    #[test]
    fn raw_copy_between_slots() {
        let scratch = GamScratch::build(
            &[binding("in", SignalType::Uint8, 4)],
            &[binding("out", SignalType::Uint8, 4)],
        );
        let params = Node::new();
        let setup = SetupContext::new("T", &params, &scratch);
        let src = setup.raw_input_at(0).expect("raw input");
        let dst = setup.raw_output_at(0).expect("raw output");
        let input = setup.input_slot_at::<u8>(0).expect("typed input");
        let output = setup.output_slot_at::<u8>(0).expect("typed output");

        let mut ctx = CycleContext::new(&scratch, 0);
        ctx.write(input).copy_from_slice(&[5, 6, 7, 8]);
        ctx.copy_raw(src, dst).expect("copy");
        assert_eq!(ctx.read(output), &[5, 6, 7, 8]);
    }
}
