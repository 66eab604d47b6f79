use std::cell::UnsafeCell;

use reflex_signal::{SignalBinding, SignalType};

/// Metadata of one signal slot inside a module's scratch.
#[derive(Debug, Clone)]
pub struct ScratchSlot {
    /// The name the module used in its signal declaration.
    pub name: String,
    pub offset: usize,
    pub byte_size: usize,
    pub signal_type: SignalType,
    /// Elements of one sample times the number of samples: the length of
    /// the typed view.
    pub elements: usize,
}

/// A module's private signal memory: the union of its input and output
/// regions, 8-byte aligned per slot, with offsets fixed at build time.
///
/// Input brokers write into it and the owning worker thread reads it in
/// the same cycle, under the brokers-before-execute ordering; hence the
/// interior mutability.
pub struct GamScratch {
    storage: Box<[UnsafeCell<u64>]>,
    inputs: Vec<ScratchSlot>,
    outputs: Vec<ScratchSlot>,
}

// Raw-pointer access only; the pipeline ordering (input brokers, execute,
// output brokers, all on one thread) serializes every touch.
unsafe impl Send for GamScratch {}
unsafe impl Sync for GamScratch {}

fn layout_slots(bindings: &[SignalBinding], cursor: &mut usize) -> Vec<ScratchSlot> {
    bindings
        .iter()
        .map(|binding| {
            *cursor = (*cursor + 7) & !7;
            let slot = ScratchSlot {
                name: binding.declared_name.clone(),
                offset: *cursor,
                byte_size: binding.byte_size as usize,
                signal_type: binding.signal_type.clone(),
                elements: (binding.num_elements_total * binding.num_samples) as usize,
            };
            *cursor += slot.byte_size;
            slot
        })
        .collect()
}

impl GamScratch {
    /// Lays out inputs first, then outputs, and zero-fills the storage.
    pub fn build(inputs: &[SignalBinding], outputs: &[SignalBinding]) -> Self {
        let mut cursor = 0usize;
        let input_slots = layout_slots(inputs, &mut cursor);
        let output_slots = layout_slots(outputs, &mut cursor);
        let words = ((cursor + 7) & !7) / 8;
        let storage = (0..words)
            .map(|_| UnsafeCell::new(0u64))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        GamScratch {
            storage,
            inputs: input_slots,
            outputs: output_slots,
        }
    }

    pub fn input_slots(&self) -> &[ScratchSlot] {
        &self.inputs
    }

    pub fn output_slots(&self) -> &[ScratchSlot] {
        &self.outputs
    }

    pub fn input_slot(&self, name: &str) -> Option<&ScratchSlot> {
        self.inputs.iter().find(|slot| slot.name == name)
    }

    pub fn output_slot(&self, name: &str) -> Option<&ScratchSlot> {
        self.outputs.iter().find(|slot| slot.name == name)
    }

    /// Base address of the scratch. Stable for the scratch's lifetime.
    pub fn base_ptr(&self) -> *mut u8 {
        self.storage.as_ptr() as *mut u8
    }

    /// Address of a slot.
    pub fn slot_ptr(&self, slot: &ScratchSlot) -> *mut u8 {
        unsafe { self.base_ptr().add(slot.offset) }
    }

    /// Total scratch size in bytes.
    pub fn len(&self) -> usize {
        self.storage.len() * 8
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn slots_are_aligned_and_ordered() {
        let scratch = GamScratch::build(
            &[
                binding("a", SignalType::Uint8, 3),
                binding("b", SignalType::Float64, 2),
            ],
            &[binding("c", SignalType::Int32, 1)],
        );
        assert_eq!(scratch.input_slots()[0].offset, 0);
        assert_eq!(scratch.input_slots()[1].offset, 8);
        assert_eq!(scratch.output_slots()[0].offset, 24);
        assert_eq!(scratch.len(), 32);
        assert!(scratch.input_slot("b").is_some());
        assert!(scratch.output_slot("b").is_none());
    }

    #[test]
    fn empty_module_scratch() {
        let scratch = GamScratch::build(&[], &[]);
        assert!(scratch.is_empty());
    }
}
