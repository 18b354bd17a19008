//! Hot multicast topics.
//!
//! A [`Topic`] fans every published item out to the subscribers it has at
//! that moment. Late subscribers see only what is published after they join.
//! Closing a topic completes every subscription.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

struct TopicState<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    closed: bool,
}

pub struct Topic<T> {
    state: Arc<Mutex<TopicState<T>>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Topic")
            .field("subscribers", &state.subscribers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> Topic<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TopicState {
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TopicState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start receiving items published from now on.
    ///
    /// Subscribing to a closed topic yields a subscription that is already
    /// complete.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.attach(tx);
        Subscription { rx }
    }

    /// Forward items into an existing channel. Returns `false` if the topic
    /// is closed, in which case `sender` is dropped.
    pub fn attach(&self, sender: mpsc::UnboundedSender<T>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.subscribers.push(sender);
        true
    }

    /// Complete every subscription. Later publishes are discarded.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl<T: Clone> Topic<T> {
    /// Deliver `item` to every live subscriber, returning how many got it.
    ///
    /// Subscribers whose receiving side was dropped are pruned.
    pub fn publish(&self, item: T) -> usize {
        let mut state = self.lock();
        if state.closed {
            return 0;
        }
        state.subscribers.retain(|tx| tx.send(item.clone()).is_ok());
        state.subscribers.len()
    }
}

/// Receiving side of a [`Topic`] subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Next item, or `None` once the topic is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next item if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
