//! Connection monitor: state transitions plus event fan-out to observers.

use crate::types::Timestamp;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use super::types::{
    ConnectionEvent, ConnectionState, DropReason, ObserverConfig, ObserverHandle, ObserverId,
};

/// Internal observer state.
struct Observer {
    sender: Sender<ConnectionEvent>,
}

impl Observer {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (observer will be dropped).
    fn try_send(&self, event: ConnectionEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Tracks the connection state of a store and notifies observers of every
/// transition.
///
/// The state can be polled with [`state`](Self::state) and
/// [`uptime`](Self::uptime), or followed through [`subscribe`](Self::subscribe).
pub struct ConnectionMonitor {
    state: RwLock<ConnectionState>,
    observers: RwLock<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    /// Create a monitor in the `Disconnected` state.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Time since the connection was established, zero when not connected.
    pub fn uptime(&self) -> Duration {
        match &*self.state.read() {
            ConnectionState::Connected { since } => since.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Register an observer.
    pub fn subscribe(&self, config: ObserverConfig) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.observers.write().insert(id, Observer { sender });

        ObserverHandle { id, receiver }
    }

    /// Remove an observer.
    pub fn unsubscribe(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            // Best effort
            let _ = observer.sender.try_send(ConnectionEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    // --- Transitions ---

    pub(crate) fn mark_connected(&self, database: &str, collection: &str) {
        *self.state.write() = ConnectionState::Connected {
            since: Timestamp::now(),
        };
        info!(target: "dotkv::connection", database, collection, "Connected");
        self.broadcast(ConnectionEvent::Connected {
            database: database.to_string(),
            collection: collection.to_string(),
        });
    }

    pub(crate) fn mark_disconnected(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        info!(target: "dotkv::connection", "Disconnected");
        self.broadcast(ConnectionEvent::Disconnected);
    }

    pub(crate) fn mark_failed(&self, reason: &str) {
        *self.state.write() = ConnectionState::Failed {
            reason: reason.to_string(),
        };
        warn!(target: "dotkv::connection", reason, "Connection failed");
        self.broadcast(ConnectionEvent::ConnectionError {
            message: reason.to_string(),
        });
    }

    /// Report a failed request without changing state.
    pub(crate) fn report_error(&self, message: &str) {
        warn!(target: "dotkv::connection", message, "Store request failed");
        self.broadcast(ConnectionEvent::ConnectionError {
            message: message.to_string(),
        });
    }

    pub(crate) fn report_disconnection_error(&self, message: &str) {
        warn!(target: "dotkv::connection", message, "Disconnect failed");
        self.broadcast(ConnectionEvent::DisconnectionError {
            message: message.to_string(),
        });
    }

    /// Send an event to all observers, dropping those that can't keep up.
    fn broadcast(&self, event: ConnectionEvent) {
        let mut to_drop = Vec::new();

        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if !observer.try_send(event.clone()) {
                    to_drop.push(*id);
                }
            }
        }

        if !to_drop.is_empty() {
            let mut observers = self.observers.write();
            for id in to_drop {
                if let Some(observer) = observers.remove(&id) {
                    warn!(target: "dotkv::connection", observer = id.0, "Dropping slow observer");
                    let _ = observer.sender.try_send(ConnectionEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_unsubscribe() {
        let monitor = ConnectionMonitor::new();
        let handle = monitor.subscribe(ObserverConfig::default());
        assert_eq!(monitor.observer_count(), 1);

        monitor.unsubscribe(handle.id);
        assert_eq!(monitor.observer_count(), 0);
        assert_eq!(
            handle.try_recv().unwrap(),
            ConnectionEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_transitions_are_broadcast() {
        let monitor = ConnectionMonitor::new();
        let handle = monitor.subscribe(ObserverConfig::default());

        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        monitor.mark_connected("db", "records");
        assert!(monitor.state().is_connected());
        monitor.mark_disconnected();
        assert_eq!(monitor.state(), ConnectionState::Disconnected);

        let events = handle.drain();
        assert_eq!(
            events,
            vec![
                ConnectionEvent::Connected {
                    database: "db".into(),
                    collection: "records".into(),
                },
                ConnectionEvent::Disconnected,
            ]
        );
    }

    #[test]
    fn test_failed_state() {
        let monitor = ConnectionMonitor::new();
        monitor.mark_failed("locked");
        assert_eq!(
            monitor.state(),
            ConnectionState::Failed {
                reason: "locked".into()
            }
        );
        assert_eq!(monitor.uptime(), Duration::ZERO);
    }

    #[test]
    fn test_slow_observer_dropped() {
        let monitor = ConnectionMonitor::new();
        let _handle = monitor.subscribe(ObserverConfig { buffer_size: 1 });

        monitor.report_error("first");
        assert_eq!(monitor.observer_count(), 1);

        // Buffer is full now
        monitor.report_error("second");
        assert_eq!(monitor.observer_count(), 0);
    }

    #[test]
    fn test_uptime_zero_when_disconnected() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.uptime(), Duration::ZERO);
        monitor.mark_connected("db", "c");
        monitor.mark_disconnected();
        assert_eq!(monitor.uptime(), Duration::ZERO);
    }
}
