// src/core/shutdown.rs
//! Pipeline-wide cancellation token.
//!
//! Triggering the signal wakes every waiter and closes every registered
//! closer (shared channels, accepted connections, the live broadcaster),
//! so stages blocked on a channel or a socket observe termination.

use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::core::lock::lock_mutex;

/// Something that can be closed as part of coordinated shutdown.
pub trait Closer: Send + Sync {
    fn close(&self);
    fn label(&self) -> String;
}

struct State {
    triggered: bool,
    reason: Option<String>,
    closers: Vec<Arc<dyn Closer>>,
}

struct Inner {
    state: Mutex<State>,
    condvar: Condvar,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    triggered: false,
                    reason: None,
                    closers: Vec::new(),
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Registers a closer. If the signal already fired, it is closed right away.
    pub fn register(&self, closer: Arc<dyn Closer>) {
        let mut state = lock_mutex(&self.inner.state, "shutdown.register");
        if state.triggered {
            drop(state);
            closer.close();
            return;
        }
        state.closers.push(closer);
    }

    /// Idempotent; only the first reason is kept.
    pub fn trigger(&self, reason: &str) {
        let closers = {
            let mut state = lock_mutex(&self.inner.state, "shutdown.trigger");
            if state.triggered {
                return;
            }
            state.triggered = true;
            state.reason = Some(reason.to_string());
            std::mem::take(&mut state.closers)
        };

        log::info!("[shutdown] triggered: {}", reason);
        self.inner.condvar.notify_all();

        for closer in closers {
            log::debug!("[shutdown] closing {}", closer.label());
            closer.close();
        }
    }

    pub fn is_triggered(&self) -> bool {
        lock_mutex(&self.inner.state, "shutdown.is_triggered").triggered
    }

    pub fn reason(&self) -> Option<String> {
        lock_mutex(&self.inner.state, "shutdown.reason").reason.clone()
    }

    /// Sleeps up to `timeout`. Returns `true` if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = lock_mutex(&self.inner.state, "shutdown.wait_timeout");
        while !state.triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.inner.condvar.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

/// Shuts down an accepted TCP connection so a blocked read returns.
pub struct ConnectionCloser {
    peer: String,
    stream: TcpStream,
}

impl ConnectionCloser {
    pub fn new(stream: &TcpStream) -> std::io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self {
            peer,
            stream: stream.try_clone()?,
        })
    }
}

impl Closer for ConnectionCloser {
    fn close(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    fn label(&self) -> String {
        format!("connection:{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channel::ClosableChannel;
    use std::thread;

    #[test]
    fn test_trigger_closes_registered_channels() {
        let shutdown = ShutdownSignal::new();
        let a: ClosableChannel<u32> = ClosableChannel::new("a");
        let b: ClosableChannel<String> = ClosableChannel::new("b");
        shutdown.register(Arc::new(a.clone()));
        shutdown.register(Arc::new(b.clone()));

        shutdown.trigger("test");
        shutdown.trigger("second");

        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(shutdown.reason().as_deref(), Some("test"));
    }

    #[test]
    fn test_register_after_trigger_closes_immediately() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger("early");

        let ch: ClosableChannel<u8> = ClosableChannel::new("late");
        shutdown.register(Arc::new(ch.clone()));
        assert!(ch.is_closed());
    }

    #[test]
    fn test_wait_timeout_wakes_on_trigger() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.wait_timeout(Duration::from_millis(5)));

        let waiter = {
            let shutdown = shutdown.clone();
            thread::spawn(move || shutdown.wait_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        shutdown.trigger("wake");

        assert!(waiter.join().expect("waiter thread"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
