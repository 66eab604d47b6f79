use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use reflex_error::{Error, Result};
use reflex_signal::SignalRegistry;

/// Contiguous storage for the two banks of one DataSource.
///
/// Signals are packed sequentially; bank `b` of signal `i` starts at
/// `b * bank_len + offset[i]`. The backing buffer is allocated once and
/// never resized, so raw pointers into it stay valid for the arena's whole
/// lifetime.
pub struct MemoryArena {
    // u64 words keep every signal slot 8-byte aligned
    storage: Box<[UnsafeCell<u64>]>,
    bank_len: usize,
    offsets: Vec<usize>,
    sizes: Vec<usize>,
    active: AtomicU32,
}

// The arena hands out raw pointers and never creates references into the
// storage. Concurrent access is governed by the double-buffer discipline:
// within one cycle all brokers address one bank, and the active index has
// a single writer.
unsafe impl Send for MemoryArena {}
unsafe impl Sync for MemoryArena {}

impl MemoryArena {
    /// Packs every signal of the registry twice and zero-fills the storage.
    pub fn allocate(registry: &SignalRegistry) -> Self {
        let mut offsets = Vec::with_capacity(registry.len());
        let mut sizes = Vec::with_capacity(registry.len());
        let mut cursor = 0usize;
        for signal in registry.iter() {
            // 8-byte alignment for every slot so typed views stay aligned
            cursor = (cursor + 7) & !7;
            offsets.push(cursor);
            sizes.push(signal.byte_size as usize);
            cursor += signal.byte_size as usize;
        }
        let bank_len = (cursor + 7) & !7;
        let words = bank_len / 4; // two banks of bank_len bytes, 8 bytes a word
        let storage = (0..words)
            .map(|_| UnsafeCell::new(0u64))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        MemoryArena {
            storage,
            bank_len,
            offsets,
            sizes,
            active: AtomicU32::new(0),
        }
    }

    /// Length of one bank in bytes.
    pub fn bank_len(&self) -> usize {
        self.bank_len
    }

    /// Offset of a signal inside either bank.
    pub fn signal_offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    pub fn signal_size(&self, index: usize) -> Option<usize> {
        self.sizes.get(index).copied()
    }

    /// The bank most recently published by the scheduler.
    pub fn active_buffer(&self) -> usize {
        self.active.load(Ordering::Acquire) as usize
    }

    /// Publishes the bank of the starting cycle. The scheduler is the only
    /// caller.
    pub fn set_active_buffer(&self, bank: usize) {
        debug_assert!(bank < 2);
        self.active.store(bank as u32, Ordering::Release);
    }

    /// Base address of a bank.
    pub fn base_ptr(&self, bank: usize) -> *mut u8 {
        debug_assert!(bank < 2);
        let base = self.storage.as_ptr() as *mut u8;
        // bank_len is a multiple of 8, so this stays in bounds of storage
        unsafe { base.add(bank * self.bank_len) }
    }

    /// Address of one signal in one bank.
    pub fn signal_ptr(&self, bank: usize, index: usize) -> Option<*mut u8> {
        let offset = self.signal_offset(index)?;
        Some(unsafe { self.base_ptr(bank).add(offset) })
    }

    /// Bounds-checked write of a whole signal. Control-path only; the
    /// real-time path goes through broker copy tables.
    pub fn write_signal(&self, bank: usize, index: usize, bytes: &[u8]) -> Result<()> {
        let size = self
            .signal_size(index)
            .ok_or_else(|| Error::parameters("signal index out of range"))?;
        if bytes.len() != size {
            return Err(Error::parameters("signal byte length mismatch"));
        }
        let dest = self.signal_ptr(bank, index).expect("index checked above");
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dest, size) };
        Ok(())
    }

    /// Bounds-checked read of a whole signal.
    pub fn read_signal(&self, bank: usize, index: usize, out: &mut [u8]) -> Result<()> {
        let size = self
            .signal_size(index)
            .ok_or_else(|| Error::parameters("signal index out of range"))?;
        if out.len() != size {
            return Err(Error::parameters("signal byte length mismatch"));
        }
        let src = self.signal_ptr(bank, index).expect("index checked above");
        unsafe { std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), size) };
        Ok(())
    }
}
