//! Property-based tests for domain value objects
//!
//! These tests use proptest to verify invariants across many random inputs.

use domain::value_objects::{
    CallSiteId, ExecutionIndex, IndexSegment, MAX_INDEX_DEPTH, MAX_SESSION_ID_LEN, RpcStatus,
    SessionId, digest_arguments, resolve_http_status,
};
use proptest::prelude::*;

fn call_site() -> impl Strategy<Value = CallSiteId> {
    "[a-z]{1,8}\\.[A-Z][a-zA-Z]{0,8}".prop_map(|s| CallSiteId::new(s).unwrap())
}

fn index() -> impl Strategy<Value = ExecutionIndex> {
    prop::collection::vec((call_site(), 0u32..8), 0..12).prop_map(|segments| {
        let segments = segments
            .into_iter()
            .map(|(site, n)| IndexSegment::new(site, n))
            .collect();
        ExecutionIndex::from_segments(segments).unwrap()
    })
}

// ============================================================================
// ExecutionIndex Property Tests
// ============================================================================

mod execution_index_tests {
    use super::*;

    proptest! {
        #[test]
        fn child_extends_parent(parent in index(), site in call_site(), n in 0u32..100) {
            let child = parent.child(site.clone(), n).unwrap();

            prop_assert_eq!(child.depth(), parent.depth() + 1);
            prop_assert!(parent.is_prefix_of(&child));
            prop_assert!(!child.is_prefix_of(&parent));
            prop_assert_eq!(child.parent(), Some(parent));
            prop_assert_eq!(child.leaf(), Some(&IndexSegment::new(site, n)));
        }

        #[test]
        fn siblings_differ(parent in index(), site in call_site(), n in 0u32..100) {
            let first = parent.child(site.clone(), n).unwrap();
            let second = parent.child(site, n + 1).unwrap();

            prop_assert_ne!(&first, &second);
            prop_assert_eq!(first.parent(), second.parent());
        }

        #[test]
        fn json_form_is_accepted_back(idx in index()) {
            let json = serde_json::to_string(&idx).unwrap();
            let back: ExecutionIndex = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, idx);
        }

        #[test]
        fn display_lists_every_segment(idx in index()) {
            let rendered = idx.to_string();
            prop_assert!(rendered.starts_with('[') && rendered.ends_with(']'));
            prop_assert_eq!(rendered.matches('#').count(), idx.depth());
        }
    }

    #[test]
    fn depth_limit_is_enforced() {
        let site = CallSiteId::new("a.B").unwrap();
        let segments = vec![IndexSegment::new(site.clone(), 0); MAX_INDEX_DEPTH];
        let deepest = ExecutionIndex::from_segments(segments).unwrap();

        assert!(deepest.child(site, 0).is_err());
    }

    #[test]
    fn over_deep_json_is_rejected() {
        let segment = serde_json::json!({"callSiteId": "a.B", "occurrenceCount": 0});
        let json = serde_json::Value::Array(vec![segment; MAX_INDEX_DEPTH + 1]);

        assert!(serde_json::from_value::<ExecutionIndex>(json).is_err());
    }
}

// ============================================================================
// SessionId Property Tests
// ============================================================================

mod session_id_tests {
    use super::*;

    proptest! {
        #[test]
        fn visible_ascii_accepted(s in "[!-+\\--~]{1,128}") {
            let id = SessionId::parse(s.clone()).unwrap();
            prop_assert_eq!(id.as_str(), s.as_str());
        }

        #[test]
        fn commas_rejected(prefix in "[a-z]{0,10}", suffix in "[a-z]{0,10}") {
            let input = format!("{prefix},{suffix}");
            prop_assert!(SessionId::parse(input).is_err());
        }

        #[test]
        fn whitespace_rejected(prefix in "[a-z]{0,10}", ws in "[ \t\n]") {
            let input = format!("{prefix}{ws}");
            prop_assert!(SessionId::parse(input).is_err());
        }

        #[test]
        fn overlong_rejected(extra in 1usize..64) {
            prop_assert!(SessionId::parse("x".repeat(MAX_SESSION_ID_LEN + extra)).is_err());
        }
    }

    #[test]
    fn generated_ids_parse() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.to_string()).unwrap(), id);
    }
}

// ============================================================================
// CallSiteId Property Tests
// ============================================================================

mod call_site_id_tests {
    use super::*;

    proptest! {
        #[test]
        fn method_sites_join_with_dot(service in "[a-z.]{1,20}", method in "[A-Za-z]{1,20}") {
            let id = CallSiteId::for_method(&service, &method).unwrap();
            prop_assert_eq!(id.as_str(), format!("{service}.{method}"));
        }

        #[test]
        fn any_non_empty_label_accepted(label in ".{1,64}") {
            prop_assert!(CallSiteId::new(label).is_ok());
        }
    }

    #[test]
    fn empty_rejected() {
        assert!(CallSiteId::new("").is_err());
    }
}

// ============================================================================
// Status And Digest Property Tests
// ============================================================================

mod status_tests {
    use super::*;

    proptest! {
        #[test]
        fn numeric_codes_resolve(code in 0u16..=16) {
            let status = RpcStatus::from_code(code).unwrap();
            prop_assert_eq!(RpcStatus::resolve(&code.to_string()), status);
            prop_assert_eq!(RpcStatus::resolve(status.name()), status);
        }

        #[test]
        fn unknown_kinds_resolve_to_unknown(kind in "[a-z]{20,30}") {
            prop_assert_eq!(RpcStatus::resolve(&kind), RpcStatus::Unknown);
            prop_assert_eq!(resolve_http_status(&kind), 500);
        }

        #[test]
        fn http_statuses_pass_through(status in 100u16..=599) {
            prop_assert_eq!(resolve_http_status(&status.to_string()), status);
        }

        #[test]
        fn digest_is_stable_hex(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let digest = digest_arguments(&bytes);
            prop_assert_eq!(digest.len(), 64);
            prop_assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
            prop_assert_eq!(digest_arguments(&bytes), digest);
        }
    }
}
