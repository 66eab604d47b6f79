use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use reflex_error::{Error, Result};

use crate::message::MessageRef;

/// Outcome of offering a message to one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The filter handled the message; the chain stops.
    Handled,
    /// Not this filter's message; the chain continues.
    Ignored,
}

/// A message handler in a recipient's chain.
///
/// Filters must not install or remove filters on their own pool from
/// inside [`MessageFilter::consume`]; a send to the recipient being
/// delivered to is refused with a `Communication` error.
pub trait MessageFilter: Send {
    fn name(&self) -> &str;

    fn consume(&mut self, message: &MessageRef) -> Result<FilterOutcome>;

    /// One-shot filters are removed from the pool after handling a
    /// message.
    fn is_permanent(&self) -> bool {
        true
    }
}

/// The ordered filter chain of one recipient.
#[derive(Default)]
pub struct FilterPool {
    filters: Mutex<Vec<Box<dyn MessageFilter>>>,
    in_progress: AtomicBool,
}

impl FilterPool {
    pub fn new() -> Self {
        FilterPool::default()
    }

    /// Installs a filter at the front of the chain.
    pub fn install(&self, filter: Box<dyn MessageFilter>) {
        self.filters.lock().insert(0, filter);
    }

    /// Installs a filter at the back of the chain.
    pub fn install_back(&self, filter: Box<dyn MessageFilter>) {
        self.filters.lock().push(filter);
    }

    /// Removes the first filter with the given name.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut filters = self.filters.lock();
        let position = filters
            .iter()
            .position(|filter| filter.name() == name)
            .ok_or_else(|| {
                Error::unsupported(format!("no message filter named {name}"))
            })?;
        filters.remove(position);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.filters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.lock().is_empty()
    }

    /// Offers the message to the chain; the first filter that accepts it
    /// handles it. Reentrant delivery to the same pool is refused.
    pub fn consume(&self, message: &MessageRef) -> Result<()> {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            return Err(Error::communication(
                "reentrant message delivery to the same recipient",
            ));
        }
        let result = self.consume_chain(message);
        self.in_progress.store(false, Ordering::Release);
        result
    }

    fn consume_chain(&self, message: &MessageRef) -> Result<()> {
        let mut filters = self.filters.lock();
        let mut handled_at = None;
        let mut failure = None;
        for (index, filter) in filters.iter_mut().enumerate() {
            match filter.consume(message) {
                Ok(FilterOutcome::Handled) => {
                    handled_at = Some(index);
                    break;
                }
                Ok(FilterOutcome::Ignored) => {}
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        match handled_at {
            Some(index) => {
                if !filters[index].is_permanent() {
                    filters.remove(index);
                }
                Ok(())
            }
            None => Err(Error::unsupported("no filter accepted the message")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, SharedMessage};
    use reflex_error::ErrorKind;

    struct FunctionFilter {
        name: String,
        accepts: String,
        hits: std::sync::Arc<std::sync::atomic::AtomicU64>,
        permanent: bool,
    }

    impl MessageFilter for FunctionFilter {
        fn name(&self) -> &str {
            &self.name
        }

        fn consume(&mut self, message: &MessageRef) -> Result<FilterOutcome> {
            if message.with(|m| m.function == self.accepts) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(FilterOutcome::Handled)
            } else {
                Ok(FilterOutcome::Ignored)
            }
        }

        fn is_permanent(&self) -> bool {
            self.permanent
        }
    }

    fn filter(
        name: &str,
        accepts: &str,
        permanent: bool,
    ) -> (
        Box<FunctionFilter>,
        std::sync::Arc<std::sync::atomic::AtomicU64>,
    ) {
        let hits = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        (
            Box::new(FunctionFilter {
                name: name.to_owned(),
                accepts: accepts.to_owned(),
                hits: std::sync::Arc::clone(&hits),
                permanent,
            }),
            hits,
        )
    }

    #[test]
    fn first_accepting_filter_wins() {
        let pool = FilterPool::new();
        let (ping_a, hits_a) = filter("a", "Ping", true);
        let (ping_b, hits_b) = filter("b", "Ping", true);
        pool.install_back(ping_a);
        pool.install_back(ping_b);

        let message = SharedMessage::new(Message::new("R", "Ping"));
        pool.consume(&message).expect("handled");
        assert_eq!(hits_a.load(Ordering::Relaxed), 1);
        assert_eq!(hits_b.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn unmatched_message_is_unsupported() {
        let pool = FilterPool::new();
        let (ping, _) = filter("a", "Ping", true);
        pool.install_back(ping);
        let message = SharedMessage::new(Message::new("R", "Pong"));
        let err = pool.consume(&message).expect_err("nothing accepts");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn one_shot_filters_are_removed_after_handling() {
        let pool = FilterPool::new();
        let (catcher, hits) = filter("catcher", "Ping", false);
        pool.install(catcher);
        assert_eq!(pool.len(), 1);

        let message = SharedMessage::new(Message::new("R", "Ping"));
        pool.consume(&message).expect("handled");
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn removal_by_name() {
        let pool = FilterPool::new();
        let (ping, _) = filter("a", "Ping", true);
        pool.install(ping);
        pool.remove("a").expect("removed");
        let err = pool.remove("a").expect_err("gone");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }
}
