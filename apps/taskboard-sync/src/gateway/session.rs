//! Per-connection lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Observable connection state plus the reconnect attempt counter.
pub struct ConnectionStatus {
    state: watch::Sender<ConnectionState>,
    /// Attempts made since the last successful handshake.
    attempts: AtomicU32,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Enter `Connecting`. Returns the 1-based attempt number.
    pub fn begin_attempt(&self) -> u32 {
        self.set(ConnectionState::Connecting);
        self.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn mark_connected(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.set(ConnectionState::Connected);
    }

    pub fn mark_disconnected(&self) {
        self.set(ConnectionState::Disconnected);
    }

    /// Back to the initial state after an explicit teardown.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.set(ConnectionState::Disconnected);
    }

    fn set(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}
