// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the mirror protocol.
//!
//! Errors are categorized by where they occur in the replication path.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Remote` | Yes | A command-channel batch (set/delete/publish) failed |
//! | `InvalidConfiguration` | No | Malformed or missing store URL |
//! | `NotConnected` | No | Channels were closed when they were needed |
//! | `SyncFailed` | No | Bootstrap get failed or returned unparsable data |
//! | `EventParse` | No | Malformed change-event payload |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Propagation Policy
//!
//! Local in-memory mutations never fail; only remote propagation can. After a
//! `Remote` error the local mirror may be ahead of the store — callers decide
//! whether to retry (see [`MirrorError::is_retryable()`]) or resync.
//! Subscription-delivery errors (`EventParse`) are isolated per message and
//! never escalate past the apply loop.

use thiserror::Error;

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that can occur while mirroring a namespace.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Malformed or missing store URL at connect time.
    ///
    /// Fatal to that connect call. Fix the URL and reconnect.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An operation needed open channels but the connection was closed.
    ///
    /// Raised at mapping construction against a disconnected store, or when
    /// channels are requested before `connect()`.
    #[error("Not connected to the store")]
    NotConnected,

    /// A command-channel batch failed.
    ///
    /// The local mirror was already updated optimistically and is not rolled
    /// back; it may be ahead of the remote store. Retryable.
    #[error("Remote operation failed ({operation}): {message}")]
    Remote {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// Bootstrap sync failed (get error or unparsable snapshot).
    ///
    /// Non-fatal to the mapping: `data` stays empty and the mapping still
    /// becomes ready. Surfaced through the monitor callback as informational.
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    /// A change-event payload could not be parsed.
    ///
    /// One bad message must not break future delivery: the apply loop logs
    /// and drops it, so this variant never escalates to the process.
    #[error("Event parse error: {0}")]
    EventParse(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Create a `Remote` error from a redis::RedisError.
    pub fn remote(operation: impl Into<String>, source: redis::RedisError) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a `Remote` error without a source.
    pub fn remote_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { .. } => true, // Network errors are retryable
            Self::InvalidConfiguration(_) => false,
            Self::NotConnected => false,
            Self::SyncFailed(_) => false,
            Self::EventParse(_) => false,
            Self::Internal(_) => false,
        }
    }
}

impl From<redis::RedisError> for MirrorError {
    fn from(e: redis::RedisError) -> Self {
        Self::remote("unknown", e)
    }
}
