use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reflex_config::Node;
use reflex_timer::Timeout;

/// An addressed request to a named recipient.
#[derive(Debug, Clone)]
pub struct Message {
    pub destination: String,
    pub sender: Option<String>,
    /// The requested operation, interpreted by the recipient's filters.
    pub function: String,
    pub payload: Node,
    pub expects_reply: bool,
    pub indirect_reply: bool,
    /// Budget the sender is willing to wait for a reply.
    pub deadline: Timeout,
    /// Set by the handler once the message has been turned into a reply.
    pub is_reply: bool,
}

impl Message {
    pub fn new<D, F>(destination: D, function: F) -> Message
    where
        D: Into<String>,
        F: Into<String>,
    {
        Message {
            destination: destination.into(),
            sender: None,
            function: function.into(),
            payload: Node::new(),
            expects_reply: false,
            indirect_reply: false,
            deadline: Timeout::INFINITE,
            is_reply: false,
        }
    }

    pub fn with_sender<S: Into<String>>(mut self, sender: S) -> Message {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_payload(mut self, payload: Node) -> Message {
        self.payload = payload;
        self
    }

    pub fn with_deadline(mut self, deadline: Timeout) -> Message {
        self.deadline = deadline;
        self
    }
}

/// A message shared between sender, bus and recipient.
///
/// The sender keeps its `Arc` and polls [`SharedMessage::is_replied`];
/// handlers mutate the payload and then [`SharedMessage::mark_replied`].
/// The message is destroyed when the last holder releases it.
pub struct SharedMessage {
    inner: Mutex<Message>,
    replied: AtomicBool,
}

/// Shared-ownership handle to a message.
pub type MessageRef = Arc<SharedMessage>;

impl SharedMessage {
    pub fn new(message: Message) -> MessageRef {
        Arc::new(SharedMessage {
            inner: Mutex::new(message),
            replied: AtomicBool::new(false),
        })
    }

    /// Reads the message under its lock.
    pub fn with<R>(&self, read: impl FnOnce(&Message) -> R) -> R {
        read(&self.inner.lock())
    }

    /// Mutates the message under its lock.
    pub fn update<R>(&self, write: impl FnOnce(&mut Message) -> R) -> R {
        write(&mut self.inner.lock())
    }

    /// Marks the message as carrying its reply.
    pub fn mark_replied(&self) {
        self.inner.lock().is_reply = true;
        self.replied.store(true, Ordering::Release);
    }

    pub fn is_replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }
}
