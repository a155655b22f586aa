// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-event wire codec and expiration-marker naming.
//!
//! Every mutation is broadcast on the namespace's change topic as a small
//! JSON record: `{"a": <code>, "key": ..., "value": ...}` with action codes
//! 1=SET, 2=DELETE, 3=CLEAR. `key` is present for SET/DELETE, `value` only
//! for SET. All mirrors of a namespace (the publisher included) consume these
//! records; applying them is idempotent, so self-delivery is harmless.
//!
//! # Expiration Markers
//!
//! A `set` with a TTL also writes an auxiliary key `<name>-ex=<key>` whose
//! only job is to expire. The store's expired-key notification then carries
//! the marker's full name; [`key_from_marker`] reverse-maps it to the local
//! key to delete. The marker's value is never read.

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pattern for the store-wide expired-key notification channel.
///
/// Covers every database index; the marker prefix filter does the real
/// namespace scoping.
pub const EXPIRED_EVENT_PATTERN: &str = "__keyevent@*__:expired";

/// Action carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Set,
    Delete,
    Clear,
}

impl Action {
    /// Integer wire code for this action.
    pub fn code(&self) -> u8 {
        match self {
            Action::Set => 1,
            Action::Delete => 2,
            Action::Clear => 3,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Action::Set),
            2 => Some(Action::Delete),
            3 => Some(Action::Clear),
            _ => None,
        }
    }

    /// Stable lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Set => "set",
            Action::Delete => "delete",
            Action::Clear => "clear",
        }
    }
}

/// A change event as published on a namespace's change topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub action: Action,
    /// Present for SET and DELETE.
    pub key: Option<String>,
    /// Present for SET.
    pub value: Option<Value>,
}

/// On-the-wire shape. Kept separate so the public type can hold a validated
/// `Action` instead of a raw code.
#[derive(Serialize, Deserialize)]
struct WireEvent {
    a: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

impl ChangeEvent {
    /// A SET event for `key` with `value`.
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self {
            action: Action::Set,
            key: Some(key.into()),
            value: Some(value),
        }
    }

    /// A DELETE event for `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            action: Action::Delete,
            key: Some(key.into()),
            value: None,
        }
    }

    /// A CLEAR event for the whole namespace.
    pub fn clear() -> Self {
        Self {
            action: Action::Clear,
            key: None,
            value: None,
        }
    }

    /// Encode to the UTF-8 JSON wire form.
    pub fn encode(&self) -> Result<String> {
        let wire = WireEvent {
            a: self.action.code(),
            key: self.key.clone(),
            value: self.value.clone(),
        };
        serde_json::to_string(&wire)
            .map_err(|e| MirrorError::Internal(format!("event encode: {}", e)))
    }

    /// Decode from the wire form, validating field presence per action.
    pub fn decode(payload: &str) -> Result<Self> {
        let wire: WireEvent = serde_json::from_str(payload)
            .map_err(|e| MirrorError::EventParse(format!("invalid event JSON: {}", e)))?;

        let action = Action::from_code(wire.a)
            .ok_or_else(|| MirrorError::EventParse(format!("unknown action code: {}", wire.a)))?;

        match action {
            Action::Set => {
                if wire.key.is_none() {
                    return Err(MirrorError::EventParse("SET event missing key".to_string()));
                }
                if wire.value.is_none() {
                    return Err(MirrorError::EventParse("SET event missing value".to_string()));
                }
            }
            Action::Delete => {
                if wire.key.is_none() {
                    return Err(MirrorError::EventParse("DELETE event missing key".to_string()));
                }
            }
            Action::Clear => {}
        }

        Ok(Self {
            action,
            key: wire.key,
            value: wire.value,
        })
    }
}

/// Prefix shared by all expiration markers of a namespace.
pub fn marker_prefix(name: &str) -> String {
    format!("{}-ex=", name)
}

/// Deterministic marker key for `(namespace, key)`.
pub fn marker_key(name: &str, key: &str) -> String {
    format!("{}-ex={}", name, key)
}

/// Reverse-map an expired marker name to the local key it stands for.
///
/// Returns `None` for markers belonging to other namespaces (including
/// namespaces that merely share a prefix with ours).
pub fn key_from_marker<'a>(name: &str, marker: &'a str) -> Option<&'a str> {
    let rest = marker.strip_prefix(name)?;
    rest.strip_prefix("-ex=")
}
