use std::time::Duration;

/// Bound for a blocking operation.
///
/// `ZERO` means a non-blocking poll, `INFINITE` an unbounded wait, anything
/// else an OS-level bounded wait. Callers use [`Timeout::is_finite`] to
/// decide whether the underlying primitive must be switched into
/// non-blocking mode around the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(Option<Duration>);

impl Timeout {
    /// Non-blocking poll.
    pub const ZERO: Timeout = Timeout(Some(Duration::ZERO));

    /// Unbounded wait.
    pub const INFINITE: Timeout = Timeout(None);

    /// A bounded wait.
    pub const fn finite(duration: Duration) -> Self {
        Timeout(Some(duration))
    }

    /// A bounded wait expressed in milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Timeout(Some(Duration::from_millis(millis)))
    }

    /// True unless this is [`Timeout::INFINITE`].
    pub fn is_finite(&self) -> bool {
        self.0.is_some()
    }

    /// True for the non-blocking poll.
    pub fn is_zero(&self) -> bool {
        self.0 == Some(Duration::ZERO)
    }

    /// The bound, or `None` for an unbounded wait.
    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    /// Remaining budget after `elapsed`. An unbounded timeout stays
    /// unbounded; a finite one saturates at zero.
    pub fn remaining(&self, elapsed: Duration) -> Timeout {
        match self.0 {
            Some(bound) => Timeout(Some(bound.saturating_sub(elapsed))),
            None => Timeout::INFINITE,
        }
    }

    /// True when a finite budget is used up after `elapsed`.
    pub fn expired(&self, elapsed: Duration) -> bool {
        match self.0 {
            Some(bound) => elapsed >= bound,
            None => false,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::finite(duration)
    }
}
