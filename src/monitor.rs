// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Monitor callback seams.
//!
//! Both the connection and each mapping accept an optional callback that is
//! invoked with lifecycle and error notifications. Invocation is
//! fire-and-forget: the callback's return is ignored and it must not block.

use std::sync::Arc;

/// Classification of a monitor notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    /// Connectivity or lifecycle state change.
    State,
    /// Informational, e.g. bootstrap found no snapshot.
    Info,
    /// Something failed; the message carries the detail.
    Error,
}

impl MonitorKind {
    /// Stable lowercase label, for callers that key off strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::State => "state",
            MonitorKind::Info => "info",
            MonitorKind::Error => "error",
        }
    }
}

/// Connection-level monitor: `(kind, message)` with kind in {State, Error}.
pub type ConnectionMonitor = Arc<dyn Fn(MonitorKind, &str) + Send + Sync>;

/// Mapping-level monitor: `(kind, message, name)`.
pub type MapMonitor = Arc<dyn Fn(MonitorKind, &str, &str) + Send + Sync>;

/// Notify a connection monitor, if one is installed.
pub(crate) fn notify(monitor: &Option<ConnectionMonitor>, kind: MonitorKind, message: &str) {
    if let Some(m) = monitor {
        m(kind, message);
    }
}

/// Notify a mapping monitor, if one is installed.
pub(crate) fn notify_map(
    monitor: &Option<MapMonitor>,
    kind: MonitorKind,
    message: &str,
    name: &str,
) {
    if let Some(m) = monitor {
        m(kind, message, name);
    }
}
