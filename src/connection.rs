// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store connection management.
//!
//! Owns the two logical channels every mapping needs:
//!
//! - the **command channel**: a multiplexed async connection used for
//!   get/set/delete and atomic batches. Cloning is cheap and all mappings
//!   share one underlying socket.
//! - the **subscription channel**: a dedicated pub/sub connection. A
//!   connection in subscribe mode cannot issue commands, which is why the
//!   channels are separate. The pushed-message half is pumped by a single
//!   dispatcher task into an in-process broadcast bus; each mapping filters
//!   the bus for its own topics.
//!
//! # Lifecycle
//!
//! ```text
//! new (URL validated) → connect → connected ─┬→ disconnect
//!                          ↑                 └→ subscription stream ends
//!                          └──── reconnect ──────────┘
//! ```
//!
//! `connect()` is idempotent while connected; `disconnect()` is always
//! idempotent. Connect-time the store's expired-key notifications are enabled
//! (`notify-keyspace-events Ex`) and the global expired-event pattern is
//! subscribed once for all mappings.

use crate::config::ConnectConfig;
use crate::error::{MirrorError, Result};
use crate::event::EXPIRED_EVENT_PATTERN;
use crate::monitor::{notify, ConnectionMonitor, MonitorKind};
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink, PubSubStream};
use redis::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A message pushed over the subscription channel.
///
/// `pattern` is set for pattern-subscription deliveries (the expired-key
/// stream); plain topic deliveries carry only `channel`.
#[derive(Debug, Clone)]
pub struct PushMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Matching pattern, for pattern subscriptions.
    pub pattern: Option<String>,
    /// UTF-8 payload.
    pub payload: String,
}

/// Handle to the subscription channel, shared by all mappings.
#[derive(Clone)]
pub struct Subscriptions {
    /// Sink half of the pub/sub connection, for issuing SUBSCRIBE.
    sink: Arc<Mutex<PubSubSink>>,
    /// Fan-out of everything the stream half delivers.
    bus: broadcast::Sender<PushMessage>,
    /// Cleared when the stream half ends or `disconnect()` runs.
    connected: Arc<AtomicBool>,
}

impl Subscriptions {
    /// Subscribe the underlying connection to a topic.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.sink
            .lock()
            .await
            .subscribe(topic)
            .await
            .map_err(|e| MirrorError::remote("SUBSCRIBE", e))
    }

    /// Get a receiver over all pushed messages.
    ///
    /// Receivers only see messages sent after this call; take the receiver
    /// before triggering whatever you want to observe.
    pub fn receiver(&self) -> broadcast::Receiver<PushMessage> {
        self.bus.subscribe()
    }

    /// Whether the subscription channel is still delivering.
    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// The two live channels handed to every mapping.
#[derive(Clone)]
pub struct Channels {
    /// Command channel. Clone freely; it multiplexes one socket.
    pub commands: ConnectionManager,
    /// Subscription channel handle.
    pub subscriptions: Subscriptions,
}

impl std::fmt::Debug for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channels").finish_non_exhaustive()
    }
}

impl Channels {
    /// Whether both channels are usable.
    pub fn is_open(&self) -> bool {
        self.subscriptions.is_open()
    }
}

struct Inner {
    channels: Channels,
    dispatcher: tokio::task::JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

/// Manages one store connection and hands out [`Channels`].
///
/// One `Connection` serves any number of mappings; mappings sharing a
/// connection share both channels and must not assume exclusive access.
pub struct Connection {
    config: ConnectConfig,
    monitor: Option<ConnectionMonitor>,
    inner: Mutex<Option<Inner>>,
}

impl Connection {
    /// Create a connection manager for the given store URL.
    ///
    /// Validates the URL scheme up front; fails with `InvalidConfiguration`
    /// for URLs that could never connect. No network I/O happens here.
    pub fn new(config: ConnectConfig, monitor: Option<ConnectionMonitor>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            monitor,
            inner: Mutex::new(None),
        })
    }

    /// Open both channels and start the dispatcher.
    ///
    /// Idempotent: while connected, returns the existing channels without
    /// reconnecting. After a `disconnect()` or a dropped subscription stream
    /// it opens fresh channels.
    ///
    /// Failures surface both through the monitor callback (`Error`) and as
    /// the returned error; no automatic retry is performed.
    pub async fn connect(&self) -> Result<Channels> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.as_ref() {
            if existing.connected.load(Ordering::Acquire) {
                debug!(url = %self.config.url, "Already connected");
                return Ok(existing.channels.clone());
            }
            // Stale entry from a dead subscription stream
            existing.dispatcher.abort();
        }

        info!(url = %self.config.url, "Connecting to store");

        let client = Client::open(self.config.url.as_str())
            .map_err(|e| MirrorError::InvalidConfiguration(format!("invalid store URL: {}", e)))?;

        let open_timeout = self.config.connect_timeout_duration();
        // Both channels open concurrently; either failing fails the connect.
        let opened = timeout(open_timeout, async {
            tokio::try_join!(client.get_connection_manager(), client.get_async_pubsub())
        })
        .await;

        let (commands, mut pubsub) = match opened {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                let err = MirrorError::remote("CONNECT", e);
                notify(&self.monitor, MonitorKind::Error, &err.to_string());
                return Err(err);
            }
            Err(_) => {
                let err = MirrorError::remote_msg(
                    "CONNECT",
                    format!("timed out after {:?}", open_timeout),
                );
                notify(&self.monitor, MonitorKind::Error, &err.to_string());
                return Err(err);
            }
        };

        // Expired-key notifications drive TTL eviction. The pub/sub
        // connection cannot issue commands, so this goes over the command
        // channel. Managed stores sometimes deny CONFIG; mirrors still work,
        // minus expiration propagation.
        let mut cmd = commands.clone();
        let configured: redis::RedisResult<()> = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut cmd)
            .await;
        if let Err(e) = configured {
            warn!(error = %e, "Could not enable expired-key notifications");
            notify(
                &self.monitor,
                MonitorKind::Error,
                &format!("notify-keyspace-events not enabled: {}", e),
            );
        }

        pubsub
            .psubscribe(EXPIRED_EVENT_PATTERN)
            .await
            .map_err(|e| {
                let err = MirrorError::remote("PSUBSCRIBE", e);
                notify(&self.monitor, MonitorKind::Error, &err.to_string());
                err
            })?;

        let (sink, stream) = pubsub.split();
        let (bus, _) = broadcast::channel(self.config.event_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(true));

        let dispatcher = tokio::spawn(run_dispatcher(
            stream,
            bus.clone(),
            Arc::clone(&connected),
            self.monitor.clone(),
        ));

        let channels = Channels {
            commands,
            subscriptions: Subscriptions {
                sink: Arc::new(Mutex::new(sink)),
                bus,
                connected: Arc::clone(&connected),
            },
        };

        *inner = Some(Inner {
            channels: channels.clone(),
            dispatcher,
            connected,
        });

        notify(&self.monitor, MonitorKind::State, "connected");
        info!(url = %self.config.url, "Connected to store");
        Ok(channels)
    }

    /// Close both channels.
    ///
    /// Idempotent; a no-op when already closed. Mappings built on this
    /// connection stop receiving events and their writes start failing.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(inner) = inner.take() {
            inner.connected.store(false, Ordering::Release);
            inner.dispatcher.abort();
            notify(&self.monitor, MonitorKind::State, "disconnected");
            info!(url = %self.config.url, "Disconnected from store");
        }
    }

    /// Get the live channels, or `NotConnected`.
    pub async fn channels(&self) -> Result<Channels> {
        let inner = self.inner.lock().await;
        match inner.as_ref() {
            Some(inner) if inner.connected.load(Ordering::Acquire) => {
                Ok(inner.channels.clone())
            }
            _ => Err(MirrorError::NotConnected),
        }
    }

    /// Check if currently connected.
    pub async fn is_connected(&self) -> bool {
        self.channels().await.is_ok()
    }
}

/// Pump pushed messages from the subscription stream into the bus.
///
/// Runs until the stream ends (connection lost or dropped). Individual
/// undecodable payloads are skipped; they must not stop delivery.
async fn run_dispatcher(
    mut stream: PubSubStream,
    bus: broadcast::Sender<PushMessage>,
    connected: Arc<AtomicBool>,
    monitor: Option<ConnectionMonitor>,
) {
    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let pattern = if msg.from_pattern() {
            msg.get_pattern::<String>().ok()
        } else {
            None
        };
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Dropping non-UTF-8 push message");
                continue;
            }
        };

        // No receivers is fine: no mapping is interested right now.
        let _ = bus.send(PushMessage {
            channel,
            pattern,
            payload,
        });
    }

    connected.store(false, Ordering::Release);
    notify(&monitor, MonitorKind::State, "subscription channel closed");
    info!("Subscription channel closed");
}
