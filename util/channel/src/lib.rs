//! Reexports `crossbeam_channel` to uniform the dependency version.

pub use crossbeam_channel::{
    after, bounded, never, select, tick, unbounded, Receiver, RecvError, RecvTimeoutError, Select,
    SendError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};

const ONESHOT_CHANNEL_SIZE: usize = 1;

pub mod oneshot {
    //! A channel carrying at most one value.

    /// Sending half of a oneshot channel.
    pub type Sender<T> = crossbeam_channel::Sender<T>;
    /// Receiving half of a oneshot channel.
    pub type Receiver<T> = crossbeam_channel::Receiver<T>;

    /// Creates a bounded channel with a single slot.
    pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
        crossbeam_channel::bounded(super::ONESHOT_CHANNEL_SIZE)
    }
}
