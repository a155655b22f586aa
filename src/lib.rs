//! # Redis Mirror
//!
//! Process-local mirrors of shared Redis-backed key/value namespaces, kept
//! convergent across processes via pub/sub change events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                             redis-mirror                                 │
//! │                                                                          │
//! │  ┌────────────┐   commands    ┌─────────────────────────────────────┐    │
//! │  │ Connection │──────────────►│ SyncedMap (per namespace)           │    │
//! │  │ (2 chans)  │               │  local data + atomic write batches  │    │
//! │  └────────────┘               └─────────────────────────────────────┘    │
//! │        │                                        ▲                        │
//! │        │ subscriptions    ┌────────────┐        │ apply loop             │
//! │        └─────────────────►│ dispatcher │────────┘ (change events +       │
//! │                           │ (broadcast)│          expired markers)       │
//! │                           └────────────┘                                 │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Convergence Model
//!
//! Every mutation is published as a change event on the namespace's topic;
//! every mirror, the publisher included, applies events from its subscription.
//! Reads are local and synchronous. Writes are local-first and optimistic:
//! the in-memory mirror updates before the remote batch is acknowledged, and
//! is never rolled back on failure. Last write wins; TTL'd keys are evicted
//! everywhere through expired-key notifications.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use redis_mirror::{ConnectConfig, Connection, MapConfig, SyncedMap};
//!
//! #[tokio::main]
//! async fn main() -> redis_mirror::Result<()> {
//!     let conn = Connection::new(ConnectConfig::new("redis://localhost:6379"), None)?;
//!     let channels = conn.connect().await?;
//!
//!     let map = SyncedMap::new(&channels, MapConfig::named("cache-apps"), None).await?;
//!     map.set("greeting", "hello", None).await?;
//!     assert!(map.has("greeting"));
//!
//!     conn.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod map;
pub mod metrics;
pub mod monitor;

// Re-exports for convenience
pub use config::{ConnectConfig, MapConfig};
pub use connection::{Channels, Connection, PushMessage, Subscriptions};
pub use error::{MirrorError, Result};
pub use event::{Action, ChangeEvent};
pub use map::{MapState, SyncedMap};
pub use monitor::{ConnectionMonitor, MapMonitor, MonitorKind};
