// src/core/broadcast.rs
//! Fan-out to every current subscriber. Unlike [`ClosableChannel`], each
//! subscriber receives its own copy of every item published after it
//! subscribed; there is no history replay.
//!
//! [`ClosableChannel`]: crate::core::channel::ClosableChannel

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::core::lock::lock_mutex;
use crate::core::shutdown::Closer;

struct Subscriber<T> {
    id: u64,
    tx: UnboundedSender<T>,
}

struct State<T> {
    closed: bool,
    subscribers: Vec<Subscriber<T>>,
}

pub struct Broadcaster<T> {
    name: String,
    state: Mutex<State<T>>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(State {
                closed: false,
                subscribers: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
        })
    }

    /// New subscription. After `close()` the returned receiver is already
    /// finished.
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        let mut state = lock_mutex(&self.state, "broadcast.subscribe");
        if state.closed {
            return rx;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.subscribers.push(Subscriber { id, tx });
        log::info!(
            "[{}] subscriber {} attached ({} active)",
            self.name,
            id,
            state.subscribers.len()
        );
        rx
    }

    /// Delivers `item` to every live subscriber and returns how many got it.
    /// Subscribers whose receiver is gone are dropped.
    pub fn publish(&self, item: T) -> usize {
        let mut state = lock_mutex(&self.state, "broadcast.publish");
        if state.closed {
            return 0;
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let name = &self.name;
        state.subscribers.retain(|sub| {
            if sub.tx.send(item.clone()).is_ok() {
                true
            } else {
                log::info!("[{}] subscriber {} detached", name, sub.id);
                false
            }
        });
        state.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock_mutex(&self.state, "broadcast.subscriber_count")
            .subscribers
            .len()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Ends every subscription; later publishes are ignored.
    pub fn close(&self) {
        let mut state = lock_mutex(&self.state, "broadcast.close");
        if state.closed {
            return;
        }
        state.closed = true;
        state.subscribers.clear();
        log::debug!("[{}] closed", self.name);
    }

    pub fn is_closed(&self) -> bool {
        lock_mutex(&self.state, "broadcast.is_closed").closed
    }
}

impl<T: Clone + Send + 'static> Closer for Broadcaster<T> {
    fn close(&self) {
        Broadcaster::close(self);
    }

    fn label(&self) -> String {
        format!("broadcast:{}", self.name)
    }
}
