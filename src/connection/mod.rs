//! Connection lifecycle reporting.
//!
//! A store reports its transitions (connected, disconnected, failed) to a
//! [`ConnectionMonitor`]. Callers either poll the state or subscribe and
//! receive [`ConnectionEvent`]s over a bounded channel; observers that stop
//! draining their channel are dropped.
//!
//! # Example
//!
//! ```ignore
//! let store = FileStore::open_or_create(config)?;
//! let handle = store.subscribe(ObserverConfig::default());
//!
//! store.close()?;
//! assert_eq!(handle.recv()?, ConnectionEvent::Disconnected);
//! ```

mod monitor;
mod types;

pub use monitor::ConnectionMonitor;
pub use types::{
    ConnectionEvent, ConnectionState, DropReason, ObserverConfig, ObserverHandle, ObserverId,
};
