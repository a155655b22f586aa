//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use proptest::prelude::*;
use redis_mirror::event::{key_from_marker, marker_key, marker_prefix, Action, ChangeEvent};
use serde_json::Value;

/// Arbitrary JSON values, a few levels deep.
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        "[a-zA-Z0-9 _-]{0,30}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,10}", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

// =============================================================================
// Change Event Codec Properties
// =============================================================================

proptest! {
    /// Any SET event survives an encode/decode cycle intact.
    #[test]
    fn set_event_roundtrips(key in "\\PC{1,40}", value in json_value()) {
        let original = ChangeEvent::set(key, value);
        let decoded = ChangeEvent::decode(&original.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, original);
    }

    /// Any DELETE event survives an encode/decode cycle intact.
    #[test]
    fn delete_event_roundtrips(key in "\\PC{1,40}") {
        let original = ChangeEvent::delete(key);
        let decoded = ChangeEvent::decode(&original.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, original);
    }

    /// Decoding never panics, whatever arrives on the wire.
    #[test]
    fn decode_is_total(payload in "\\PC{0,200}") {
        let _ = ChangeEvent::decode(&payload);
    }

    /// Well-formed JSON that is not a valid event is an error, not a panic.
    #[test]
    fn decode_rejects_unknown_codes(code in 4u8.., key in "[a-z]{1,10}") {
        let payload = format!(r#"{{"a":{},"key":"{}"}}"#, code, key);
        prop_assert!(ChangeEvent::decode(&payload).is_err());
    }

    /// Wire codes and labels are stable and bijective over the action set.
    #[test]
    fn action_codes_roundtrip(code in 1u8..=3) {
        let action = Action::from_code(code).unwrap();
        prop_assert_eq!(action.code(), code);
    }
}

// =============================================================================
// Expiration Marker Properties
// =============================================================================

proptest! {
    /// Reverse-mapping a namespace's own marker always recovers the key,
    /// whatever characters the key contains.
    #[test]
    fn marker_reverse_maps_own_keys(name in "[a-z0-9]{1,20}", key in "\\PC{1,40}") {
        let marker = marker_key(&name, &key);
        prop_assert!(marker.starts_with(&marker_prefix(&name)));
        prop_assert_eq!(key_from_marker(&name, &marker), Some(key.as_str()));
    }

    /// A marker belonging to a different namespace never reverse-maps,
    /// including namespaces that are a prefix or extension of ours.
    #[test]
    fn marker_rejects_foreign_namespaces(
        ours in "[a-z0-9]{1,20}",
        theirs in "[a-z0-9]{1,20}",
        key in "[a-z0-9]{1,20}",
    ) {
        prop_assume!(ours != theirs);
        let marker = marker_key(&theirs, &key);
        prop_assert_eq!(key_from_marker(&ours, &marker), None);
    }

    /// Ordinary (non-marker) expired keys never reverse-map.
    #[test]
    fn marker_rejects_plain_keys(name in "[a-z0-9]{1,20}", expired in "[a-z0-9:._]{1,40}") {
        prop_assume!(!expired.starts_with(&marker_prefix(&name)));
        prop_assert_eq!(key_from_marker(&name, &expired), None);
    }
}
