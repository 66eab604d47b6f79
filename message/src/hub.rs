use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reflex_channel::{unbounded, Sender};
use reflex_error::{Error, Result};
use reflex_logger::warn;
use reflex_timer::Timeout;

use crate::filter::{FilterOutcome, FilterPool, MessageFilter};
use crate::message::MessageRef;

struct RecipientEntry {
    filters: Arc<FilterPool>,
    queue: Option<Sender<MessageRef>>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct HubInner {
    recipients: Mutex<HashMap<String, RecipientEntry>>,
}

impl Drop for HubInner {
    fn drop(&mut self) {
        let entries: Vec<_> = self.recipients.lock().drain().collect();
        for (_, mut entry) in entries {
            // dropping the queue sender lets the worker drain and exit
            entry.queue.take();
            if let Some(worker) = entry.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

/// The recipient registry. Cheap to clone; updates are serialized by a
/// coarse mutex, which stays uncontended because registration happens at
/// setup and lookup is the only steady-state operation.
#[derive(Clone, Default)]
pub struct MessageHub {
    inner: Arc<HubInner>,
}

/// Non-owning handle for filters that must post messages back through the
/// hub they are registered on.
#[derive(Clone)]
pub struct WeakMessageHub {
    inner: std::sync::Weak<HubInner>,
}

impl WeakMessageHub {
    pub fn upgrade(&self) -> Option<MessageHub> {
        self.inner.upgrade().map(|inner| MessageHub { inner })
    }
}

impl MessageHub {
    pub fn new() -> Self {
        MessageHub::default()
    }

    pub fn downgrade(&self) -> WeakMessageHub {
        WeakMessageHub {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a synchronous recipient: its filters run on the sender's
    /// thread during `send_message`.
    pub fn register(&self, name: &str) -> Result<Arc<FilterPool>> {
        self.insert(name, false)
    }

    /// Registers an asynchronous recipient owning a worker thread;
    /// messages are queued and never block the sender.
    pub fn register_queued(&self, name: &str) -> Result<Arc<FilterPool>> {
        self.insert(name, true)
    }

    fn insert(&self, name: &str, queued: bool) -> Result<Arc<FilterPool>> {
        let mut recipients = self.inner.recipients.lock();
        if recipients.contains_key(name) {
            return Err(Error::parameters(format!(
                "recipient {name} is already registered"
            )));
        }
        let filters = Arc::new(FilterPool::new());
        let (queue, worker) = if queued {
            let (tx, rx) = unbounded::<MessageRef>();
            let pool = Arc::clone(&filters);
            let label = format!("msg-{name}");
            let recipient = name.to_owned();
            let worker = thread::Builder::new()
                .name(label)
                .spawn(move || {
                    for message in rx.iter() {
                        if let Err(err) = pool.consume(&message) {
                            warn!("recipient {recipient}: {err}");
                        }
                    }
                })
                .expect("start message worker thread should ok");
            (Some(tx), Some(worker))
        } else {
            (None, None)
        };
        recipients.insert(
            name.to_owned(),
            RecipientEntry {
                filters: Arc::clone(&filters),
                queue,
                worker,
            },
        );
        Ok(filters)
    }

    /// Removes a recipient and joins its worker, if any.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let entry = self.inner.recipients.lock().remove(name);
        let mut entry = entry.ok_or_else(|| {
            Error::unsupported(format!("no recipient named {name}"))
        })?;
        entry.queue.take();
        if let Some(worker) = entry.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }

    /// The filter pool of a registered recipient.
    pub fn filters(&self, name: &str) -> Option<Arc<FilterPool>> {
        self.inner
            .recipients
            .lock()
            .get(name)
            .map(|entry| Arc::clone(&entry.filters))
    }

    /// Fire-and-forget send. Replies route back to the sender; everything
    /// else routes to the destination. Beyond the recipient lookup this
    /// never blocks: queued recipients enqueue, synchronous recipients run
    /// their chain inline on this thread.
    pub fn send_message(&self, message: &MessageRef) -> Result<()> {
        let (route, indirect_reply, has_sender, is_reply) = message.with(|m| {
            let route = if m.is_reply {
                m.sender.clone().unwrap_or_default()
            } else {
                m.destination.clone()
            };
            (route, m.indirect_reply, m.sender.is_some(), m.is_reply)
        });
        if is_reply && !indirect_reply {
            return Err(Error::communication(
                "a direct reply returns through the shared message, not through send",
            ));
        }
        if indirect_reply && !has_sender && !is_reply {
            return Err(Error::communication(
                "an indirect reply was requested without a sender",
            ));
        }
        if route.is_empty() {
            return Err(Error::parameters("message has no routable destination"));
        }

        let (filters, queue) = {
            let recipients = self.inner.recipients.lock();
            let entry = recipients.get(&route).ok_or_else(|| {
                Error::unsupported(format!("no recipient named {route}"))
            })?;
            (
                Arc::clone(&entry.filters),
                entry.queue.clone(),
            )
        };
        match queue {
            Some(queue) => {
                queue
                    .send(Arc::clone(message))
                    .map_err(|_| Error::fatal(format!("recipient {route} worker has gone")))?;
                Ok(())
            }
            None => filters.consume(message),
        }
    }

    /// Polls a direct reply with the given period until `timeout` expires.
    /// Returns within the timeout plus one poll interval.
    pub fn wait_for_reply(
        &self,
        message: &MessageRef,
        timeout: Timeout,
        poll_interval: Duration,
    ) -> Result<()> {
        let (expects_reply, indirect_reply) =
            message.with(|m| (m.expects_reply, m.indirect_reply));
        if !expects_reply {
            return Err(Error::communication("the message does not expect a reply"));
        }
        if indirect_reply {
            return Err(Error::communication(
                "indirect replies arrive through the sender's reply catcher",
            ));
        }
        poll_until(timeout, poll_interval, || message.is_replied())
    }

    /// Sets the reply request, sends, and waits for the direct reply.
    pub fn send_message_and_wait_reply(
        &self,
        message: &MessageRef,
        timeout: Timeout,
        poll_interval: Duration,
    ) -> Result<()> {
        message.update(|m| {
            m.expects_reply = true;
            m.deadline = timeout;
        });
        self.send_message(message)?;
        self.wait_for_reply(message, timeout, poll_interval)
    }

    /// Sends expecting the recipient to post the reply back to the
    /// sender, where a one-shot reply catcher picks it up.
    pub fn send_message_and_wait_indirect_reply(
        &self,
        message: &MessageRef,
        timeout: Timeout,
        poll_interval: Duration,
    ) -> Result<()> {
        let sender = message
            .with(|m| m.sender.clone())
            .ok_or_else(|| {
                Error::communication("an indirect reply was requested without a sender")
            })?;
        let sender_pool = self.filters(&sender).ok_or_else(|| {
            Error::communication(format!("sender {sender} is not a registered recipient"))
        })?;

        let catcher_name = format!("reply-catcher-{:p}", Arc::as_ptr(message));
        let caught = Arc::new(std::sync::atomic::AtomicBool::new(false));
        sender_pool.install(Box::new(ReplyCatcher {
            name: catcher_name.clone(),
            target: Arc::clone(message),
            caught: Arc::clone(&caught),
        }));

        message.update(|m| {
            m.expects_reply = true;
            m.indirect_reply = true;
            m.deadline = timeout;
        });
        if let Err(err) = self.send_message(message) {
            let _ = sender_pool.remove(&catcher_name);
            return Err(err);
        }

        let result = poll_until(timeout, poll_interval, || {
            caught.load(std::sync::atomic::Ordering::Acquire)
        });
        if result.is_err() {
            let _ = sender_pool.remove(&catcher_name);
        }
        result
    }
}

fn poll_until(
    timeout: Timeout,
    poll_interval: Duration,
    done: impl Fn() -> bool,
) -> Result<()> {
    let started = Instant::now();
    loop {
        if done() {
            return Ok(());
        }
        if timeout.expired(started.elapsed()) {
            return Err(Error::timeout("reply wait expired"));
        }
        let nap = match timeout.remaining(started.elapsed()).duration() {
            Some(remaining) => poll_interval.min(remaining),
            None => poll_interval,
        };
        if nap.is_zero() {
            // a zero timeout is a single non-blocking check
            if done() {
                return Ok(());
            }
            return Err(Error::timeout("reply wait expired"));
        }
        thread::sleep(nap);
    }
}

/// One-shot filter matching the reply to one specific message.
struct ReplyCatcher {
    name: String,
    target: MessageRef,
    caught: Arc<std::sync::atomic::AtomicBool>,
}

impl MessageFilter for ReplyCatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, message: &MessageRef) -> Result<FilterOutcome> {
        if Arc::ptr_eq(message, &self.target) && message.is_replied() {
            self.caught
                .store(true, std::sync::atomic::Ordering::Release);
            Ok(FilterOutcome::Handled)
        } else {
            Ok(FilterOutcome::Ignored)
        }
    }

    fn is_permanent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, SharedMessage};
    use crate::DEFAULT_POLL_INTERVAL;
    use reflex_error::ErrorKind;

    struct EchoFilter {
        hub: Option<MessageHub>,
    }

    impl MessageFilter for EchoFilter {
        fn name(&self) -> &str {
            "echo"
        }

        fn consume(&mut self, message: &MessageRef) -> Result<FilterOutcome> {
            let indirect = message.with(|m| m.indirect_reply);
            message.update(|m| m.payload.insert("Status", 1i64));
            message.mark_replied();
            if indirect {
                let hub = self.hub.as_ref().expect("indirect echo needs the hub");
                hub.send_message(message)?;
            }
            Ok(FilterOutcome::Handled)
        }
    }

    #[test]
    fn unknown_destination_is_unsupported_immediately() {
        let hub = MessageHub::new();
        let message = SharedMessage::new(Message::new("nope", "Ping"));
        let err = hub.send_message(&message).expect_err("no recipient");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn direct_reply_round_trip_on_a_queued_recipient() {
        let hub = MessageHub::new();
        let pool = hub.register_queued("R").expect("register");
        pool.install_back(Box::new(EchoFilter { hub: None }));

        let message = SharedMessage::new(Message::new("R", "Ping"));
        hub.send_message_and_wait_reply(
            &message,
            Timeout::from_millis(100),
            DEFAULT_POLL_INTERVAL,
        )
        .expect("replied in time");
        assert_eq!(message.with(|m| m.payload.get_i64("Status")), Some(1));
    }

    #[test]
    fn synchronous_recipient_replies_inline() {
        let hub = MessageHub::new();
        let pool = hub.register("R").expect("register");
        pool.install_back(Box::new(EchoFilter { hub: None }));

        let message = SharedMessage::new(Message::new("R", "Ping"));
        hub.send_message_and_wait_reply(&message, Timeout::ZERO, DEFAULT_POLL_INTERVAL)
            .expect("the reply is materialized during the send");
        assert!(message.is_replied());
    }

    #[test]
    fn reply_wait_times_out_when_nobody_replies() {
        let hub = MessageHub::new();
        let _pool = hub.register_queued("silent").expect("register");
        // nothing handles the message; the wait must still end on time

        let message = SharedMessage::new(Message::new("silent", "Ping"));
        let started = Instant::now();
        let err = hub
            .send_message_and_wait_reply(
                &message,
                Timeout::from_millis(50),
                Duration::from_millis(5),
            )
            .expect_err("nobody replies");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn indirect_reply_returns_through_the_sender() {
        let hub = MessageHub::new();
        let recipient_pool = hub.register_queued("R").expect("register R");
        recipient_pool.install_back(Box::new(EchoFilter {
            hub: Some(hub.clone()),
        }));
        let _sender_pool = hub.register_queued("S").expect("register S");

        let message = SharedMessage::new(Message::new("R", "Ping").with_sender("S"));
        hub.send_message_and_wait_indirect_reply(
            &message,
            Timeout::from_millis(500),
            DEFAULT_POLL_INTERVAL,
        )
        .expect("indirect reply caught");
        assert_eq!(message.with(|m| m.payload.get_i64("Status")), Some(1));
    }

    #[test]
    fn indirect_reply_without_sender_is_a_communication_error() {
        let hub = MessageHub::new();
        let _pool = hub.register_queued("R").expect("register");
        let message = SharedMessage::new(Message::new("R", "Ping"));
        let err = hub
            .send_message_and_wait_indirect_reply(
                &message,
                Timeout::from_millis(50),
                DEFAULT_POLL_INTERVAL,
            )
            .expect_err("no sender");
        assert_eq!(err.kind(), ErrorKind::Communication);
    }

    #[test]
    fn fire_and_forget_send_does_not_block_on_a_busy_recipient() {
        let hub = MessageHub::new();
        let pool = hub.register_queued("slow").expect("register");

        struct SlowFilter;
        impl MessageFilter for SlowFilter {
            fn name(&self) -> &str {
                "slow"
            }
            fn consume(&mut self, _message: &MessageRef) -> Result<FilterOutcome> {
                thread::sleep(Duration::from_millis(50));
                Ok(FilterOutcome::Handled)
            }
        }
        pool.install_back(Box::new(SlowFilter));

        let started = Instant::now();
        for _ in 0..20 {
            let message = SharedMessage::new(Message::new("slow", "Ping"));
            hub.send_message(&message).expect("enqueue");
        }
        assert!(
            started.elapsed() < Duration::from_millis(50),
            "sends must enqueue without waiting for the handler"
        );
    }
}
