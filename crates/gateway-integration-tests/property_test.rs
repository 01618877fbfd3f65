//! Property-based tests for the gateway's namespacing scheme and config
//! validation bounds.
//!
//! Run with: cargo test --test property

use gateway_config::validator::validate_backend;
use gateway_config::{BackendConfig, TransportConfig, MAX_MAX_RETRIES, MAX_REQUEST_TIMEOUT_SECS, MIN_REQUEST_TIMEOUT_SECS};
use gateway_core::router::{decode_name, decode_uri, encode_name, encode_uri};
use proptest::prelude::*;
use std::collections::HashMap;

/// Backend ids without `_` so they can never themselves contain the `__`
/// separator and confuse `decode_name`'s leftmost-split round trip.
fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9-]{0,20}"
}

fn arb_name_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.-]{1,20}"
}

fn arb_uri_rest() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:/_.-]{1,40}"
}

fn stdio_backend(id: String, request_timeout_secs: u64, max_retries: u32) -> BackendConfig {
    BackendConfig {
        id,
        transport: TransportConfig::ChildProcess {
            command: "true".to_string(),
            args: vec![],
            env: HashMap::new(),
        },
        enabled: true,
        lazy_start: true,
        request_timeout_secs,
        max_retries,
    }
}

proptest! {
    /// Testable property 1: encoding then decoding a tool/prompt name always
    /// recovers the exact (backendId, name) pair it was built from.
    #[test]
    fn name_namespace_round_trips(backend_id in arb_identifier(), name in arb_name_segment()) {
        let encoded = encode_name(&backend_id, &name);
        let (decoded_backend, decoded_name) = decode_name(&encoded).unwrap();
        prop_assert_eq!(decoded_backend, backend_id);
        prop_assert_eq!(decoded_name, name);
    }

    /// Testable property 1, resource-URI variant: only the outermost
    /// `<backendId>://` prefix is ever stripped.
    #[test]
    fn uri_namespace_round_trips(backend_id in arb_identifier(), rest in arb_uri_rest()) {
        let encoded = encode_uri(&backend_id, &rest);
        let (decoded_backend, decoded_rest) = decode_uri(&encoded).unwrap();
        prop_assert_eq!(decoded_backend, backend_id);
        prop_assert_eq!(decoded_rest, rest);
    }

    /// Testable property 2: a namespaced name missing the `__` separator
    /// (or with either half empty) is always rejected, never mis-parsed.
    #[test]
    fn decode_name_rejects_strings_without_a_well_formed_separator(s in "[a-zA-Z0-9]{0,20}") {
        // No literal "__" in the generated alphanumeric string, so this must
        // always fail to parse as a namespaced name.
        prop_assert!(decode_name(&s).is_err());
    }

    #[test]
    fn decode_uri_rejects_strings_without_a_scheme(s in "[a-z0-9._-]{0,20}") {
        // No ':' or '/' in the generated charset, so "://" can never appear
        // and the regex can never match.
        prop_assert!(decode_uri(&s).is_err());
    }

    /// A backend's request timeout is accepted exactly when it falls within
    /// the configured bounds, regardless of which valid identifier it's paired with.
    #[test]
    fn request_timeout_bounds_are_enforced(
        id in arb_identifier(),
        timeout in 0u64..=400,
    ) {
        let backend = stdio_backend(id, timeout, 3);
        let result = validate_backend(&backend);
        let in_bounds = (MIN_REQUEST_TIMEOUT_SECS..=MAX_REQUEST_TIMEOUT_SECS).contains(&timeout);
        prop_assert_eq!(result.is_ok(), in_bounds);
    }

    #[test]
    fn max_retries_bounds_are_enforced(
        id in arb_identifier(),
        max_retries in 0u32..=20,
    ) {
        let backend = stdio_backend(id, 60, max_retries);
        let result = validate_backend(&backend);
        prop_assert_eq!(result.is_ok(), max_retries <= MAX_MAX_RETRIES);
    }

    /// A backend id that fails the letter-led alphanumeric pattern is always
    /// rejected outright, independent of its other fields.
    #[test]
    fn malformed_ids_are_always_rejected(bad_id in "[0-9_-][a-zA-Z0-9_-]{0,20}") {
        let backend = stdio_backend(bad_id, 60, 3);
        prop_assert!(validate_backend(&backend).is_err());
    }
}
