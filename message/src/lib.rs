//! Asynchronous message bus.
//!
//! Recipients register by name on a [`MessageHub`] and own a chain of
//! filters; the first filter that accepts a message handles it. Sending is
//! explicitly typed: fire-and-forget ([`MessageHub::send_message`], never
//! blocks beyond the recipient lookup), direct reply
//! ([`MessageHub::send_message_and_wait_reply`], bounded poll of the
//! shared message) or indirect reply
//! ([`MessageHub::send_message_and_wait_indirect_reply`], a reply-catcher
//! filter installed on the sender). There is no hidden blocking variant.

mod filter;
mod hub;
mod message;

pub use filter::{FilterOutcome, FilterPool, MessageFilter};
pub use hub::{MessageHub, WeakMessageHub};
pub use message::{Message, MessageRef, SharedMessage};

use std::time::Duration;

/// Default poll period for bounded reply waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
