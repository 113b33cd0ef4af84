//! Connection state and event types.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Current state of a store connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not opened yet, or closed.
    Disconnected,

    /// Open and serving requests.
    Connected { since: Timestamp },

    /// Opening failed; the store cannot serve requests.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Configuration for an observer.
#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Max buffered events before the observer is dropped.
    /// Default: 256
    pub buffer_size: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// Events delivered to connection observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The store was opened.
    Connected { database: String, collection: String },

    /// The store was closed.
    Disconnected,

    /// Opening the store, or a request against it, failed.
    ConnectionError { message: String },

    /// Closing the store failed.
    DisconnectionError { message: String },

    /// The observer was removed and will receive nothing further.
    Dropped { reason: DropReason },
}

/// Why an observer was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Event buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Handle for receiving connection events.
pub struct ObserverHandle {
    pub id: ObserverId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ConnectionEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ConnectionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ConnectionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ConnectionEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<ConnectionEvent> {
        self.receiver.try_iter().collect()
    }
}
