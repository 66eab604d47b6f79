//! Cooperative shutdown broadcast and thread registry.
//!
//! Every long-running service obtains its own exit receiver through
//! [`new_crossbeam_exit_rx`] and polls it at its safe points;
//! [`broadcast_exit_signals`] wakes all of them at once. Threads registered
//! with [`register_thread`] are joined by [`wait_all_threads_stopped`]
//! during process teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use reflex_channel::{bounded, Receiver, Sender, TrySendError};
use reflex_logger::{debug, warn};

static EXIT_SENDERS: Lazy<Mutex<Vec<Sender<()>>>> = Lazy::new(|| Mutex::new(Vec::new()));
static THREADS: Lazy<Mutex<Vec<(String, JoinHandle<()>)>>> = Lazy::new(|| Mutex::new(Vec::new()));
static STOP_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Creates a new exit receiver wired to the global broadcast.
///
/// A receiver created after the broadcast already happened yields an exit
/// signal immediately.
pub fn new_crossbeam_exit_rx() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    if STOP_RECEIVED.load(Ordering::SeqCst) {
        let _ = tx.try_send(());
    } else {
        EXIT_SENDERS.lock().push(tx);
    }
    rx
}

/// True once [`broadcast_exit_signals`] has been called.
pub fn has_received_stop_signal() -> bool {
    STOP_RECEIVED.load(Ordering::SeqCst)
}

/// Wakes every exit receiver. Idempotent.
pub fn broadcast_exit_signals() {
    debug!("broadcasting exit signal to all services");
    STOP_RECEIVED.store(true, Ordering::SeqCst);
    for tx in EXIT_SENDERS.lock().drain(..) {
        match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => warn!("exit channel is full"),
        }
    }
}

/// Registers a thread to be joined during teardown.
pub fn register_thread(name: &str, handle: JoinHandle<()>) {
    debug!("registering thread {name}");
    THREADS.lock().push((name.to_owned(), handle));
}

/// Joins every registered thread. Expected to be called after
/// [`broadcast_exit_signals`], otherwise it may block forever.
pub fn wait_all_threads_stopped() {
    let threads = {
        let mut guard = THREADS.lock();
        std::mem::take(&mut *guard)
    };
    for (name, handle) in threads {
        debug!("waiting for thread {name} to stop");
        if handle.join().is_err() {
            warn!("thread {name} panicked before it could be joined");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn broadcast_reaches_registered_and_late_receivers() {
        let rx = new_crossbeam_exit_rx();
        let waiter = thread::spawn(move || rx.recv().is_ok());
        broadcast_exit_signals();
        assert!(waiter.join().expect("join waiter"));
        assert!(has_received_stop_signal());

        // created after the broadcast, must not hang
        let late = new_crossbeam_exit_rx();
        assert!(late.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn registered_threads_are_joined() {
        let rx = new_crossbeam_exit_rx();
        register_thread(
            "test-service",
            thread::spawn(move || {
                let _ = rx.recv_timeout(Duration::from_secs(5));
            }),
        );
        broadcast_exit_signals();
        wait_all_threads_stopped();
    }
}
