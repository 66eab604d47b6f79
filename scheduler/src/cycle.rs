use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use reflex_error::{Error, Result};
use reflex_timer::Timeout;

/// Cycle-completion synchronization primitive.
///
/// Workers signal it at the end of every cycle; control-path code blocks
/// on it with a bounded timeout to pace itself against the real-time loop.
#[derive(Default)]
pub struct CycleEvent {
    count: Mutex<u64>,
    condvar: Condvar,
}

impl CycleEvent {
    pub fn new() -> Self {
        CycleEvent::default()
    }

    /// Total cycles completed since construction, over all workers.
    pub fn count(&self) -> u64 {
        *self.count.lock()
    }

    /// Called by a worker at its cycle boundary. Never blocks.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_all();
    }

    /// Blocks until the total count reaches `target`.
    pub fn wait_for(&self, target: u64, timeout: Timeout) -> Result<()> {
        let start = Instant::now();
        let mut count = self.count.lock();
        while *count < target {
            match timeout.duration() {
                None => self.condvar.wait(&mut count),
                Some(_) => {
                    let remaining = timeout.remaining(start.elapsed());
                    let Some(budget) = remaining.duration() else {
                        unreachable!("finite timeout stays finite");
                    };
                    if budget.is_zero()
                        || self.condvar.wait_for(&mut count, budget).timed_out()
                    {
                        if *count >= target {
                            break;
                        }
                        return Err(Error::timeout("cycle wait expired"));
                    }
                }
            }
        }
        Ok(())
    }
}
