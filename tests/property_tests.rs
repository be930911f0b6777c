//! Property-based tests for trueno-track
//!
//! - Test mathematical invariants of key handling and value equality
//! - Test data integrity of the tree builder and selector
//! - Run with ProptestConfig::with_cases(100)

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use proptest::prelude::*;
use quickcheck::{quickcheck, Arbitrary, Gen};
use trueno_track::backend::MemoryBackend;
use trueno_track::namespace::{self, Key, SEPARATOR};
use trueno_track::tree::select;
use trueno_track::{LogValue, TrackingStore};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,6}"
}

fn arb_key() -> impl Strategy<Value = String> {
    proptest::collection::vec(arb_segment(), 1..4).prop_map(|parts| parts.join(SEPARATOR))
}

fn arb_scalar() -> impl Strategy<Value = LogValue> {
    prop_oneof![
        Just(LogValue::Null),
        any::<bool>().prop_map(LogValue::from),
        any::<i64>().prop_map(LogValue::from),
        (-1e6f64..1e6).prop_map(LogValue::from),
        "[a-z ]{0,8}".prop_map(LogValue::from),
    ]
}

/// Nested maps whose leaves are scalars and whose objects are never empty,
/// so flatten/unflatten is lossless.
fn arb_nested() -> impl Strategy<Value = BTreeMap<String, LogValue>> {
    let leaf = arb_scalar();
    let value = leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            arb_scalar(),
            proptest::collection::btree_map(arb_segment(), inner, 1..4).prop_map(LogValue::from),
        ]
    });
    proptest::collection::btree_map(arb_segment(), value, 0..5)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: unflatten(flatten(m)) == m
    #[test]
    fn prop_flatten_roundtrip(map in arb_nested()) {
        let flat = namespace::flatten(&map, SEPARATOR).unwrap();
        prop_assert_eq!(namespace::unflatten(&flat, SEPARATOR), map);
    }

    /// Property: flattened keys are valid dotted keys with scalar values
    #[test]
    fn prop_flatten_produces_terminal_values(map in arb_nested()) {
        for (key, value) in namespace::flatten(&map, SEPARATOR).unwrap() {
            prop_assert!(namespace::validate_key(&key).is_ok());
            prop_assert!(value.as_object().is_none());
        }
    }

    /// Property: parse then display is the identity
    #[test]
    fn prop_key_roundtrip(key in arb_key()) {
        let parsed = Key::parse(&key).unwrap();
        prop_assert_eq!(parsed.to_string(), key.clone());
        prop_assert_eq!(parsed.as_dotted(), key.clone());
        let rebuilt = Key::new(parsed.namespace(), parsed.name()).unwrap();
        prop_assert_eq!(rebuilt, parsed);
    }

    /// Property: the rebuilt step tree contains every logged value
    #[test]
    fn prop_tree_preserves_value_count(shape in proptest::collection::vec(0usize..4, 1..6)) {
        let store = TrackingStore::new(MemoryBackend::new());
        let run = store.experiment("prop").unwrap().start_run(None).unwrap();

        let mut logged = 0;
        for (epoch, children) in shape.iter().enumerate() {
            let step = run.log_step("epoch", epoch as i64).unwrap();
            logged += 1;
            for i in 0..*children {
                run.log_metric_at("loss", i as f64, &step).unwrap();
                logged += 1;
            }
        }

        let tree = run.tree().unwrap();
        prop_assert_eq!(tree.len(), logged);
        prop_assert_eq!(tree.roots().len(), shape.len());
    }

    /// Property: selecting a step key yields one row per step value
    #[test]
    fn prop_select_one_row_per_leaf_path(shape in proptest::collection::vec(1usize..4, 1..5)) {
        let store = TrackingStore::new(MemoryBackend::new());
        let run = store.experiment("prop").unwrap().start_run(None).unwrap();
        for (epoch, children) in shape.iter().enumerate() {
            let step = run.log_step("epoch", epoch as i64).unwrap();
            for i in 0..*children {
                let batch = run.log_step_at("batch", i as i64, &step).unwrap();
                run.log_metric_at("loss", 0.5, &batch).unwrap();
            }
        }

        let tree = run.tree().unwrap();
        let rows = select(&tree, &["epoch", "batch", "loss"]).unwrap();
        prop_assert_eq!(rows.len(), shape.iter().sum::<usize>());
        let epochs: BTreeSet<String> = select(&tree, &["epoch"])
            .unwrap()
            .iter()
            .map(|r| r["epoch"].to_string())
            .collect();
        prop_assert_eq!(epochs.len(), shape.len());
    }
}

// ============================================================================
// QuickCheck: LogValue equality and hashing agree
// ============================================================================

#[derive(Debug, Clone)]
struct ArbValue(LogValue);

impl Arbitrary for ArbValue {
    fn arbitrary(g: &mut Gen) -> Self {
        let value = match u8::arbitrary(g) % 6 {
            0 => LogValue::Null,
            1 => LogValue::from(bool::arbitrary(g)),
            2 => LogValue::from(i64::from(i16::arbitrary(g))),
            // Integral floats must compare equal to the matching integer.
            3 => LogValue::from(f64::from(i16::arbitrary(g))),
            4 => LogValue::from(f64::arbitrary(g)),
            _ => LogValue::from(String::arbitrary(g)),
        };
        Self(value)
    }
}

fn hash_of(value: &LogValue) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Text float parsing may differ from the source by an ulp.
fn nearly_equal(a: &LogValue, b: &LogValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() <= 1e-12 * x.abs().max(1.0),
        _ => false,
    }
}

quickcheck! {
    fn qc_equal_values_hash_equal(a: ArbValue, b: ArbValue) -> bool {
        a.0 != b.0 || hash_of(&a.0) == hash_of(&b.0)
    }

    fn qc_equality_is_reflexive(a: ArbValue) -> bool {
        a.0 == a.0.clone()
    }

    fn qc_json_text_roundtrip(a: ArbValue) -> bool {
        match a.0.to_json_string() {
            Ok(text) => LogValue::from_json_str(&text)
                .map(|back| back == a.0 || nearly_equal(&back, &a.0))
                .unwrap_or(false),
            // Non-finite floats are rejected, never silently stored.
            Err(_) => a.0.as_f64().is_some_and(|f| !f.is_finite()),
        }
    }
}
