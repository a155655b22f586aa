// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronized mapping.
//!
//! A [`SyncedMap`] is a named, replicated key/value mapping. Reads are served
//! entirely from local memory; writes update memory immediately and then
//! propagate to the store and to other mirrors in one atomic remote batch.
//!
//! # Replication Paths
//!
//! ```text
//!              set/delete/clear                   change topic
//!  caller ──► local data ──► MULTI/EXEC batch ──► every mirror's apply loop
//!                                                 (the publisher included)
//!
//!  store-expired marker ──► expired-key stream ──► apply loop ──► local evict
//! ```
//!
//! The apply loop is the single authoritative mutation path for replicated
//! events. `clear()` in particular never touches local data directly: the
//! originator empties itself by observing its own CLEAR event, so every
//! mirror converges through the same code.
//!
//! # States
//!
//! `Uninitialized → Syncing (optional bootstrap) → Ready`. Writes issued
//! while a bootstrap is in flight are accepted local-first and may be
//! overwritten when the snapshot lands; see [`SyncedMap::resync`].

use crate::connection::{Channels, PushMessage};
use crate::error::{MirrorError, Result};
use crate::event::{self, Action, ChangeEvent, EXPIRED_EVENT_PATTERN};
use crate::config::MapConfig;
use crate::metrics;
use crate::monitor::{notify_map, MapMonitor, MonitorKind};
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a mapping instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    /// Constructed, apply loop not yet consuming.
    Uninitialized,
    /// Bootstrap sync in flight.
    Syncing,
    /// Serving reads and writes.
    Ready,
}

impl MapState {
    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            MapState::Uninitialized => "uninitialized",
            MapState::Syncing => "syncing",
            MapState::Ready => "ready",
        }
    }
}

impl std::fmt::Display for MapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local mirror state and the pure operations on it.
///
/// Everything here is synchronous and store-free; the lock is never held
/// across an await point. Shared between the mapping handle and its apply
/// loop.
struct MapCore {
    name: String,
    data: RwLock<serde_json::Map<String, Value>>,
}

impl MapCore {
    fn new(name: String) -> Self {
        Self {
            name,
            data: RwLock::new(serde_json::Map::new()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, serde_json::Map<String, Value>> {
        // A poisoned lock means a reader/writer panicked mid-operation; the
        // map itself is still structurally sound JSON data.
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, serde_json::Map<String, Value>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn entries(&self) -> Vec<(String, Value)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.read().clone()
    }

    fn insert(&self, key: String, value: Value) {
        self.write().insert(key, value);
    }

    fn remove(&self, key: &str) -> bool {
        self.write().shift_remove(key).is_some()
    }

    fn replace(&self, snapshot: serde_json::Map<String, Value>) {
        *self.write() = snapshot;
    }

    /// Apply a replicated change event. Idempotent for SET and DELETE;
    /// CLEAR of an empty map is a no-op by construction.
    fn apply(&self, event: &ChangeEvent) {
        match event.action {
            Action::Set => {
                if let (Some(key), Some(value)) = (&event.key, &event.value) {
                    self.insert(key.clone(), value.clone());
                }
            }
            Action::Delete => {
                if let Some(key) = &event.key {
                    self.remove(key);
                }
            }
            Action::Clear => {
                self.replace(serde_json::Map::new());
            }
        }
    }
}

/// A named, replicated key/value mapping.
///
/// All instances sharing a `name` and a store observe the same logical
/// namespace and converge on the same contents (eventual, last-write-wins).
/// Reads never touch the store; writes resolve once the remote batch is
/// acknowledged, with local state updated first and never rolled back.
pub struct SyncedMap {
    core: Arc<MapCore>,
    commands: ConnectionManager,
    monitor: Option<MapMonitor>,
    state_tx: watch::Sender<MapState>,
    state_rx: watch::Receiver<MapState>,
    apply_task: tokio::task::JoinHandle<()>,
}

impl SyncedMap {
    /// Create a mapping over already-open channels.
    ///
    /// Fails with `NotConnected` against closed channels. Subscribes the
    /// namespace change topic, starts the apply loop, then (unless
    /// `config.sync` is false) performs the one-shot bootstrap sync before
    /// returning the mapping in `Ready` state.
    pub async fn new(
        channels: &Channels,
        config: MapConfig,
        monitor: Option<MapMonitor>,
    ) -> Result<Self> {
        if !channels.is_open() {
            return Err(MirrorError::NotConnected);
        }

        let core = Arc::new(MapCore::new(config.name.clone()));
        let (state_tx, state_rx) = watch::channel(MapState::Uninitialized);

        // Receiver first, then SUBSCRIBE: events published after the
        // subscribe cannot slip past the apply loop.
        let receiver = channels.subscriptions.receiver();
        channels.subscriptions.subscribe(&config.name).await?;

        let apply_task = tokio::spawn(run_apply_loop(
            Arc::clone(&core),
            receiver,
            monitor.clone(),
        ));

        let map = Self {
            core,
            commands: channels.commands.clone(),
            monitor,
            state_tx,
            state_rx,
            apply_task,
        };

        if config.sync {
            map.set_state(MapState::Syncing);
            map.bootstrap().await;
        }
        map.set_state(MapState::Ready);

        info!(name = %map.core.name(), keys = map.len(), "Mapping ready");
        Ok(map)
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MapState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<MapState> {
        self.state_rx.clone()
    }

    // =========================================================================
    // Reads: memory only, synchronous
    // =========================================================================

    /// Get the value for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.core.get(key)
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.core.has(key)
    }

    /// Snapshot of all entries, in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.core.entries()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    // =========================================================================
    // Writes: local-first, then one atomic remote batch
    // =========================================================================

    /// Set `key` to `value`, optionally expiring after `ttl`.
    ///
    /// The local mirror is updated synchronously before any network round
    /// trip, so a following [`get()`](Self::get) sees the value even while
    /// the remote batch is in flight. The batch then atomically writes the
    /// mirror key, publishes the SET event, and (with a TTL) writes the
    /// expiration marker.
    ///
    /// Mirror-key caveat: this writes only the serialized single `value`
    /// under the mirror key, not the full snapshot, so after a set-only
    /// history the mirror key does not describe the whole namespace.
    /// `delete` rewrites the full snapshot.
    ///
    /// On a batch failure the local update is not rolled back; local state
    /// may be ahead of the store.
    pub async fn set(
        &self,
        key: impl Into<String>,
        value: impl Serialize,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| MirrorError::Internal(format!("value serialize: {}", e)))?;

        self.core.insert(key.clone(), value.clone());
        metrics::set_mirror_size(self.name(), self.core.len());

        let value_text = serde_json::to_string(&value)
            .map_err(|e| MirrorError::Internal(format!("value serialize: {}", e)))?;
        let payload = ChangeEvent::set(key.clone(), value).encode()?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET").arg(self.name()).arg(&value_text).ignore();
        pipe.cmd("PUBLISH").arg(self.name()).arg(&payload).ignore();
        if let Some(ttl) = ttl {
            // EX needs at least 1 second; the marker's value is never read
            pipe.cmd("SET")
                .arg(event::marker_key(self.name(), &key))
                .arg(0)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .ignore();
        }

        self.run_batch(pipe, "set").await
    }

    /// Delete `key`.
    ///
    /// Removes locally first, then atomically rewrites the mirror key with
    /// the full current snapshot and publishes the DELETE event.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.core.remove(key);
        metrics::set_mirror_size(self.name(), self.core.len());

        let snapshot_text = serde_json::to_string(&Value::Object(self.core.snapshot()))
            .map_err(|e| MirrorError::Internal(format!("snapshot serialize: {}", e)))?;
        let payload = ChangeEvent::delete(key).encode()?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET").arg(self.name()).arg(&snapshot_text).ignore();
        pipe.cmd("PUBLISH").arg(self.name()).arg(&payload).ignore();

        self.run_batch(pipe, "delete").await
    }

    /// Clear the namespace.
    ///
    /// Does not touch local data directly: it atomically deletes the mirror
    /// key and publishes the CLEAR event, and local data empties when this
    /// mapping observes its own CLEAR through the subscription. All mirrors,
    /// originator included, converge through that one path — callers must
    /// not expect `len() == 0` the instant this resolves.
    pub async fn clear(&self) -> Result<()> {
        let payload = ChangeEvent::clear().encode()?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("DEL").arg(self.name()).ignore();
        pipe.cmd("PUBLISH").arg(self.name()).arg(&payload).ignore();

        self.run_batch(pipe, "clear").await
    }

    /// Re-run the bootstrap sync for manual recovery.
    ///
    /// On success the snapshot wholesale-replaces local data; when the mirror
    /// key is absent or unparsable, local data is left untouched and an
    /// informational monitor event is emitted. Writes racing a resync may be
    /// overwritten by the landing snapshot.
    pub async fn resync(&self) {
        self.set_state(MapState::Syncing);
        self.bootstrap().await;
        self.set_state(MapState::Ready);
    }

    /// One-shot full-state pull from the mirror key. Never fails the caller;
    /// `SyncFailed` conditions are downgraded to monitor events.
    async fn bootstrap(&self) {
        let name = self.core.name().to_string();
        let mut conn = self.commands.clone();

        let raw: redis::RedisResult<Option<String>> =
            redis::cmd("GET").arg(&name).query_async(&mut conn).await;

        match raw {
            Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(snapshot)) => {
                    let keys = snapshot.len();
                    self.core.replace(snapshot);
                    metrics::record_bootstrap(&name, true, keys);
                    metrics::set_mirror_size(&name, keys);
                    info!(name = %name, keys, "Bootstrap sync applied");
                }
                _ => {
                    // A set-only history leaves a bare value under the
                    // mirror key; it is not a usable snapshot.
                    metrics::record_bootstrap(&name, false, 0);
                    debug!(name = %name, "Mirror key holds no object snapshot");
                    notify_map(
                        &self.monitor,
                        MonitorKind::Info,
                        "sync: mirror key held no usable snapshot",
                        &name,
                    );
                }
            },
            Ok(None) => {
                metrics::record_bootstrap(&name, true, 0);
                debug!(name = %name, "No remote snapshot to sync");
                notify_map(
                    &self.monitor,
                    MonitorKind::Info,
                    "sync: no remote snapshot",
                    &name,
                );
            }
            Err(e) => {
                let err = MirrorError::SyncFailed(e.to_string());
                metrics::record_bootstrap(&name, false, 0);
                warn!(name = %name, error = %err, "Bootstrap sync failed");
                notify_map(&self.monitor, MonitorKind::Info, &err.to_string(), &name);
            }
        }
    }

    /// Submit one atomic batch and classify the outcome.
    async fn run_batch(&self, pipe: redis::Pipeline, operation: &'static str) -> Result<()> {
        let mut conn = self.commands.clone();
        let result: redis::RedisResult<()> = pipe.query_async(&mut conn).await;

        match result {
            Ok(()) => {
                metrics::record_write(self.name(), operation, true);
                trace!(name = %self.name(), operation, "Remote batch acknowledged");
                Ok(())
            }
            Err(e) => {
                metrics::record_write(self.name(), operation, false);
                let err = MirrorError::remote(operation, e);
                warn!(name = %self.name(), operation, error = %err, "Remote batch failed");
                notify_map(&self.monitor, MonitorKind::Error, &err.to_string(), self.name());
                Err(err)
            }
        }
    }

    fn set_state(&self, state: MapState) {
        let _ = self.state_tx.send(state);
        notify_map(&self.monitor, MonitorKind::State, state.as_str(), self.name());
    }
}

impl Drop for SyncedMap {
    fn drop(&mut self) {
        self.apply_task.abort();
    }
}

/// Consume pushed messages and apply the ones addressed to this mapping.
///
/// Runs until the bus closes (connection disconnect). Per-message isolation:
/// a malformed payload is logged, counted, reported, and skipped — it never
/// stops delivery of later events.
async fn run_apply_loop(
    core: Arc<MapCore>,
    mut receiver: broadcast::Receiver<PushMessage>,
    monitor: Option<MapMonitor>,
) {
    loop {
        let msg = match receiver.recv().await {
            Ok(msg) => msg,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(name = %core.name(), skipped, "Apply loop lagged; events were dropped");
                notify_map(
                    &monitor,
                    MonitorKind::Error,
                    &format!("apply loop dropped {} events", skipped),
                    core.name(),
                );
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(name = %core.name(), "Subscription bus closed; apply loop exiting");
                break;
            }
        };

        if msg.pattern.as_deref() == Some(EXPIRED_EVENT_PATTERN) {
            // Payload is the expired key's full name
            if let Some(key) = event::key_from_marker(core.name(), &msg.payload) {
                if core.remove(key) {
                    metrics::record_expiration(core.name());
                    metrics::set_mirror_size(core.name(), core.len());
                    debug!(name = %core.name(), key = %key, "Evicted expired key");
                }
            }
            continue;
        }

        if msg.channel != core.name() {
            continue;
        }

        match ChangeEvent::decode(&msg.payload) {
            Ok(event) => {
                core.apply(&event);
                metrics::record_event_applied(core.name(), event.action.as_str());
                metrics::set_mirror_size(core.name(), core.len());
                trace!(
                    name = %core.name(),
                    action = event.action.as_str(),
                    key = event.key.as_deref().unwrap_or(""),
                    "Applied change event"
                );
            }
            Err(e) => {
                metrics::record_event_dropped(core.name());
                warn!(name = %core.name(), error = %e, "Dropping unparsable change event");
                notify_map(&monitor, MonitorKind::Error, &e.to_string(), core.name());
            }
        }
    }
}
