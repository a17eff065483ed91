// src/app/handshake.rs
use std::time::Duration;

use crate::core::channel::ClosableChannel;
use crate::types::{ClientItem, ControlToken};

const REQUEUE_DELAY: Duration = Duration::from_millis(2);

/// Blocks until `expected` comes out of the channel. Tokens meant for the
/// other stage are put back. Returns `false` if the channel closed first.
pub fn wait_for_token(channel: &ClosableChannel<ClientItem>, expected: ControlToken) -> bool {
    if channel.is_closed() {
        return false;
    }

    log::debug!("[handshake] waiting for {:?}", expected);
    while let Some(item) = channel.get() {
        match item {
            ClientItem::Token(token) if token == expected => {
                log::debug!("[handshake] received {:?}", expected);
                return true;
            }
            other => {
                if !channel.put(other) {
                    return false;
                }
                std::thread::sleep(REQUEUE_DELAY);
            }
        }
    }
    false
}
