// src/core/channel.rs
//! Unbounded hand-off queue with an explicit, idempotent close.
//!
//! Every item is delivered to exactly one consumer. `close()` enqueues a
//! close marker behind everything already queued, so consumers drain the
//! pending items first and then observe the end of the stream. A consumer
//! that takes the marker puts it back, which lets every other consumer
//! (current or future) terminate as well.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::core::lock::{lock_rwlock_read, lock_rwlock_write};
use crate::core::shutdown::Closer;

enum Message<T> {
    Item(T),
    Close,
}

struct Inner<T> {
    name: String,
    tx: Sender<Message<T>>,
    rx: Receiver<Message<T>>,
    // Sends happen under this lock: nothing can land behind the close marker
    closed: RwLock<bool>,
}

/// Result of a receive with timeout.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    Item(T),
    Timeout,
    Closed,
}

pub struct ClosableChannel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ClosableChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ClosableChannel<T> {
    pub fn new(name: &str) -> Self {
        let (tx, rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                tx,
                rx,
                closed: RwLock::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueues `item`. Returns `false` (and drops the item) once the
    /// channel has been closed; nothing behind the close marker would ever
    /// be delivered.
    pub fn put(&self, item: T) -> bool {
        let closed = lock_rwlock_read(&self.inner.closed, "channel.put");
        if *closed {
            log::debug!("[channel:{}] put after close, item dropped", self.name());
            return false;
        }
        // Sender und Receiver leben im selben Inner, send kann nicht scheitern.
        let _ = self.inner.tx.send(Message::Item(item));
        true
    }

    /// Blocks until an item is available. `None` means the channel is
    /// closed and fully drained.
    pub fn get(&self) -> Option<T> {
        match self.inner.rx.recv() {
            Ok(Message::Item(item)) => Some(item),
            Ok(Message::Close) | Err(_) => {
                self.pass_on_close();
                None
            }
        }
    }

    pub fn get_timeout(&self, timeout: Duration) -> Recv<T> {
        match self.inner.rx.recv_timeout(timeout) {
            Ok(Message::Item(item)) => Recv::Item(item),
            Ok(Message::Close) | Err(RecvTimeoutError::Disconnected) => {
                self.pass_on_close();
                Recv::Closed
            }
            Err(RecvTimeoutError::Timeout) => Recv::Timeout,
        }
    }

    /// Idempotent. Items enqueued before the call are still delivered.
    pub fn close(&self) {
        let mut closed = lock_rwlock_write(&self.inner.closed, "channel.close");
        if *closed {
            return;
        }
        *closed = true;
        let _ = self.inner.tx.send(Message::Close);
        log::debug!("[channel:{}] closed", self.name());
    }

    pub fn is_closed(&self) -> bool {
        *lock_rwlock_read(&self.inner.closed, "channel.is_closed")
    }

    /// Number of queued entries, close marker included.
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    /// Lazy, in-order iteration that ends when the channel is closed.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { channel: self }
    }

    fn pass_on_close(&self) {
        let _ = self.inner.tx.send(Message::Close);
    }
}

impl<T: Send + 'static> Closer for ClosableChannel<T> {
    fn close(&self) {
        ClosableChannel::close(self);
    }

    fn label(&self) -> String {
        format!("channel:{}", self.name())
    }
}

pub struct Iter<'a, T> {
    channel: &'a ClosableChannel<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.channel.get()
    }
}

impl<'a, T> IntoIterator for &'a ClosableChannel<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drains_pending_items_after_close() {
        let ch = ClosableChannel::new("test");
        for i in 0..5 {
            assert!(ch.put(i));
        }
        ch.close();

        let items: Vec<i32> = ch.iter().collect();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert!(ch.is_closed());
    }

    #[test]
    fn test_consumer_started_before_items_terminates() {
        let ch = ClosableChannel::new("test");
        let consumer = {
            let ch = ch.clone();
            thread::spawn(move || ch.iter().collect::<Vec<u32>>())
        };

        thread::sleep(Duration::from_millis(20));
        for i in 0..100 {
            ch.put(i);
        }
        ch.close();

        let received = consumer.join().expect("consumer thread");
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_is_idempotent() {
        let ch: ClosableChannel<u8> = ClosableChannel::new("test");
        ch.close();
        ch.close();
        ch.close();
        assert_eq!(ch.get(), None);
        assert_eq!(ch.get(), None);
    }

    #[test]
    fn test_put_after_close_is_rejected() {
        let ch = ClosableChannel::new("test");
        ch.put(1);
        ch.close();
        assert!(!ch.put(2));
        assert_eq!(ch.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_close_unblocks_all_consumers() {
        let ch: ClosableChannel<u8> = ClosableChannel::new("test");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ch = ch.clone();
                thread::spawn(move || ch.get())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        ch.close();

        for h in handles {
            assert_eq!(h.join().expect("consumer thread"), None);
        }
    }

    #[test]
    fn test_consumers_split_the_stream() {
        let ch = ClosableChannel::new("test");
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let ch = ch.clone();
                thread::spawn(move || ch.iter().collect::<Vec<u32>>())
            })
            .collect();

        for i in 0..300 {
            ch.put(i);
        }
        ch.close();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("consumer thread"))
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..300).collect::<Vec<_>>());
    }

    #[test]
    fn test_accepted_put_survives_concurrent_close() {
        for _ in 0..500 {
            let ch = ClosableChannel::new("race");
            let putter = {
                let ch = ch.clone();
                thread::spawn(move || {
                    let mut accepted = 0usize;
                    while ch.put(accepted) {
                        accepted += 1;
                    }
                    accepted
                })
            };

            thread::yield_now();
            ch.close();
            let accepted = putter.join().expect("putter thread");
            assert_eq!(ch.iter().count(), accepted);
            assert!(!ch.put(usize::MAX));
        }
    }

    #[test]
    fn test_get_timeout() {
        let ch = ClosableChannel::new("test");
        assert_eq!(ch.get_timeout(Duration::from_millis(5)), Recv::Timeout);
        ch.put(7u8);
        assert_eq!(ch.get_timeout(Duration::from_millis(5)), Recv::Item(7));
        ch.close();
        assert_eq!(ch.get_timeout(Duration::from_millis(5)), Recv::Closed);
    }
}
