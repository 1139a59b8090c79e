//! Property-based invariant tests for the conditions engine and containers.
//!
//! 1. Numeric comparison keys agree with native integer comparison
//! 2. Inclusive ranges (including negative bounds) match exactly their span
//! 3. Index wrapping stays in bounds and counts negatives from the end
//! 4. Index keys round-trip through the key parser
//! 5. Plain words fall through to string equality
//! 6. Integer stringification matches Rust's own formatting
//! 7. Wrapping a container is identity stable for arbitrary keys

use proptest::prelude::*;
use serde_json::json;
use spark_dom::conditions::config::{parse_index_key, wrap_index};
use spark_dom::conditions::{is_truthy, to_js_string};
use spark_dom::{state, MatcherRegistry, Reactive};

const RESERVED: &[&str] = &["true", "false", "null", "undefined", "empty", "truthy", "falsy"];

// ═════════════════════════════════════════════════════════════════════════
// 1. Comparisons
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn comparisons_agree_with_native(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let matchers = MatcherRegistry::new();
        let value = json!(a);
        prop_assert_eq!(matchers.classify(&value, &format!(">{b}")), a > b);
        prop_assert_eq!(matchers.classify(&value, &format!(">={b}")), a >= b);
        prop_assert_eq!(matchers.classify(&value, &format!("<{b}")), a < b);
        prop_assert_eq!(matchers.classify(&value, &format!("<={b}")), a <= b);
        prop_assert_eq!(matchers.classify(&value, &format!("=={b}")), a == b);
        prop_assert_eq!(matchers.classify(&value, &b.to_string()), a == b);
    }

    #[test]
    fn fractional_values_compare(a in -1000.0f64..1000.0, b in -1000i64..1000) {
        let matchers = MatcherRegistry::new();
        prop_assert_eq!(matchers.classify(&json!(a), &format!(">{b}")), a > b as f64);
        prop_assert_eq!(matchers.classify(&json!(a), &format!("<={b}")), a <= b as f64);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Ranges
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn ranges_are_inclusive(x in -500i64..500, lo in -500i64..500, span in 0i64..300) {
        let hi = lo + span;
        let matchers = MatcherRegistry::new();
        prop_assert_eq!(
            matchers.classify(&json!(x), &format!("{lo}-{hi}")),
            lo <= x && x <= hi
        );
    }

    #[test]
    fn inverted_ranges_never_match(x in -500i64..500, lo in 1i64..500, gap in 1i64..100) {
        let matchers = MatcherRegistry::new();
        let condition = format!("{lo}-{}", lo - gap);
        prop_assert!(!matchers.classify(&json!(x), &condition));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3-4. Index keys
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn wrap_index_stays_in_bounds(len in 1usize..64, index in -64i64..64) {
        match wrap_index(index, len) {
            Some(resolved) => {
                prop_assert!(resolved < len);
                let expected = if index < 0 { len as i64 + index } else { index };
                prop_assert_eq!(resolved as i64, expected);
            }
            None => prop_assert!(index >= len as i64 || index < -(len as i64)),
        }
    }

    #[test]
    fn index_keys_parse_back(index in any::<i32>()) {
        prop_assert_eq!(parse_index_key(&index.to_string()), Some(index as i64));
    }

    #[test]
    fn non_numeric_keys_are_not_indexes(key in "[a-zA-Z_][a-zA-Z0-9_]{0,12}") {
        prop_assert_eq!(parse_index_key(&key), None);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5-6. Strings
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn plain_words_use_string_equality(word in "[a-z]{1,10}", other in "[a-z]{1,10}") {
        prop_assume!(!RESERVED.contains(&word.as_str()));
        let matchers = MatcherRegistry::new();
        prop_assert!(matchers.classify(&json!(word), &word));
        prop_assert_eq!(matchers.classify(&json!(other), &word), other == word);
    }

    #[test]
    fn integers_stringify_natively(n in any::<i64>()) {
        prop_assert_eq!(to_js_string(&json!(n)), n.to_string());
    }

    #[test]
    fn strings_are_truthy_when_non_empty(s in ".{0,16}") {
        prop_assert_eq!(is_truthy(&json!(s)), !s.is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Containers
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn wrapping_is_identity_stable(key in "[a-z]{1,8}", n in any::<i32>()) {
        let s = state(json!({ key.clone(): { "n": n } }));
        let child = s.child(&key);
        prop_assert!(child.is_some());
        let child = child.unwrap();
        prop_assert!(Reactive::wrap(&child).is_some_and(|again| again.ptr_eq(&child)));
        prop_assert!(s.child(&key).is_some_and(|again| again.ptr_eq(&child)));
        prop_assert_eq!(child.get("n"), json!(n));
    }
}
