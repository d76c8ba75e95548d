//! Property tests for the identifier codec and external-id encoder.

use std::cmp::Ordering;

use obshub_id::{IdEncoders, ResourceKind, ScopedId};
use proptest::prelude::*;

fn local_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..48)
}

fn scoped_id() -> impl Strategy<Value = ScopedId> {
    prop_oneof![
        (any::<i32>(), 1..=i64::MAX).prop_map(|(scope, id)| {
            ScopedId::from_long(scope, id).expect("positive id is valid")
        }),
        (any::<i32>(), local_bytes()).prop_map(|(scope, bytes)| {
            ScopedId::from_bytes(scope, bytes).expect("non-empty bytes are valid")
        }),
        Just(ScopedId::NONE),
    ]
}

// ── text form ──

proptest! {
    #[test]
    fn text_form_round_trips(scope in any::<i32>(), bytes in local_bytes()) {
        let id = ScopedId::from_bytes(scope, bytes.clone()).expect("valid");
        let parsed: ScopedId = id.to_string().parse().expect("text form should parse");
        prop_assert_eq!(parsed.scope(), scope);
        prop_assert_eq!(parsed.as_bytes().into_owned(), bytes);
    }

    #[test]
    fn long_text_form_round_trips(scope in any::<i32>(), value in 1..=i64::MAX) {
        let id = ScopedId::from_long(scope, value).expect("valid");
        let parsed: ScopedId = id.to_string().parse().expect("text form should parse");
        prop_assert_eq!(parsed.as_long().expect("long form"), value);
        prop_assert_eq!(parsed, id);
    }
}

// ── ordering ──

proptest! {
    #[test]
    fn ordering_follows_unsigned_bytes(
        scope in any::<i32>(),
        a in local_bytes(),
        b in local_bytes(),
    ) {
        let ia = ScopedId::from_bytes(scope, a.clone()).expect("valid");
        let ib = ScopedId::from_bytes(scope, b.clone()).expect("valid");
        prop_assert_eq!(ScopedId::compare(&ia, &ib), a.cmp(&b));
    }

    #[test]
    fn long_fast_path_agrees_at_equal_length(a in 1..=i64::MAX, b in 1..=i64::MAX) {
        let ia = ScopedId::from_long(9, a).expect("valid");
        let ib = ScopedId::from_long(9, b).expect("valid");
        prop_assume!(ia.byte_len() == ib.byte_len());
        let fast = ScopedId::compare_as_long(&ia, &ib).expect("both are long-backed");
        prop_assert_eq!(fast, ScopedId::compare(&ia, &ib));
    }

    #[test]
    fn long_and_byte_forms_are_interchangeable(scope in any::<i32>(), value in 1..=i64::MAX) {
        let long = ScopedId::from_long(scope, value).expect("valid");
        let bytes = ScopedId::from_bytes(scope, long.as_bytes().into_owned()).expect("valid");
        prop_assert_eq!(&long, &bytes);
        prop_assert_eq!(long.cmp(&bytes), Ordering::Equal);
        prop_assert_eq!(bytes.as_long().expect("canonical vlq"), value);
    }
}

#[test]
fn fast_path_holds_across_small_values() {
    // exhaustive over the one- and two-byte ranges
    for a in 1..20_000i64 {
        let ia = ScopedId::from_long(1, a).expect("valid");
        for b in [1, 127, 128, 129, 255, 256, 16_383, a - 1, a + 1] {
            if b <= 0 {
                continue;
            }
            let ib = ScopedId::from_long(1, b).expect("valid");
            if ia.byte_len() != ib.byte_len() {
                continue;
            }
            let fast = ScopedId::compare_as_long(&ia, &ib).expect("long-backed");
            assert_eq!(fast, ScopedId::compare(&ia, &ib), "a={a} b={b}");
        }
    }
}

#[test]
fn byte_form_of_42_in_scope_5_equals_long_42() {
    let long = ScopedId::from_long(5, 42).expect("valid");
    let bytes = ScopedId::from_bytes(5, long.as_bytes().into_owned()).expect("valid");
    assert_eq!(bytes, long);
    assert_eq!(bytes.to_string(), long.to_string());
}

// ── external ids ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn encoder_round_trips_for_every_kind(id in scoped_id(), seed in any::<u64>()) {
        let encoders = IdEncoders::from_seed(seed).expect("encoders");
        for kind in ResourceKind::ALL {
            let encoded = encoders.encode(kind, &id);
            let decoded = encoders.decode(kind, &encoded).expect("should decode");
            prop_assert_eq!(&decoded, &id);
        }
    }

    #[test]
    fn encoder_output_differs_between_kinds(scope in 1..1000i32, value in 1..=i64::MAX) {
        let encoders = IdEncoders::from_seed(42).expect("encoders");
        let id = ScopedId::from_long(scope, value).expect("valid");
        let system = encoders.encode(ResourceKind::System, &id);
        let datastream = encoders.encode(ResourceKind::DataStream, &id);
        prop_assert_ne!(system, datastream);
    }
}
