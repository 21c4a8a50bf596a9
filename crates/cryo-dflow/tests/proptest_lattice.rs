//! Property-based tests for the abstract-value lattice and the
//! reaching-definitions map.
//!
//! These check the algebraic laws the dataflow fixpoint depends on:
//! - `merge` is idempotent, commutative, associative and ascending
//! - operators agree with concrete machine arithmetic on concrete inputs
//! - reaching-definition merge is a pointwise union with the same laws

use proptest::prelude::*;

use cryo_dflow::{AbstractValue, ReachingDefinitions};
use cryo_ir::{MemoryDomain, MemoryLocation, TermId};

// =============================================================================
// Generators
// =============================================================================

/// Generate an arbitrary abstract value of the given size.
fn arb_value(size: u32) -> impl Strategy<Value = AbstractValue> {
    (any::<u64>(), any::<u64>()).prop_map(move |(zero, one)| AbstractValue::new(size, zero, one))
}

/// Generate an arbitrary concrete abstract value of the given size.
fn arb_concrete(size: u32) -> impl Strategy<Value = AbstractValue> {
    any::<u64>().prop_map(move |value| AbstractValue::concrete(size, value))
}

/// Generate a register-domain location with small aligned extents.
fn arb_location() -> impl Strategy<Value = MemoryLocation> {
    (0i64..8, 1i64..4).prop_map(|(slot, words)| {
        MemoryLocation::new(MemoryDomain::Register, slot * 32, words * 32)
    })
}

fn arb_reaching_defs() -> impl Strategy<Value = ReachingDefinitions> {
    prop::collection::vec((arb_location(), 0u32..16), 0..8).prop_map(|entries| {
        let mut defs = ReachingDefinitions::new();
        for (location, term) in entries {
            defs.add_definition(location, TermId(term));
        }
        defs
    })
}

// =============================================================================
// Lattice laws
// =============================================================================

proptest! {
    #[test]
    fn merge_idempotent(a in arb_value(32)) {
        prop_assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn merge_commutative(a in arb_value(32), b in arb_value(32)) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_associative(a in arb_value(32), b in arb_value(32), c in arb_value(32)) {
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn merge_ascends(a in arb_value(32), b in arb_value(32)) {
        prop_assert!(a.le(&a.merge(&b)));
        prop_assert!(b.le(&a.merge(&b)));
    }

    #[test]
    fn resize_keeps_masks_in_size(a in arb_value(64), size in 0u32..64) {
        let resized = a.resize(size);
        let mask = if size >= 64 { u64::MAX } else { (1u64 << size) - 1 };
        prop_assert_eq!(resized.zero_bits() & !mask, 0);
        prop_assert_eq!(resized.one_bits() & !mask, 0);
    }

    #[test]
    fn concrete_values_are_deterministic(a in arb_concrete(32)) {
        prop_assert!(a.is_concrete());
        prop_assert!(!a.is_nondeterministic());
    }
}

// =============================================================================
// Concrete embedding: operators agree with machine arithmetic
// =============================================================================

proptest! {
    #[test]
    fn concrete_add(x in any::<u32>(), y in any::<u32>()) {
        let a = AbstractValue::concrete(32, x as u64);
        let b = AbstractValue::concrete(32, y as u64);
        prop_assert_eq!(
            a.add(&b).as_concrete().unwrap().value(),
            x.wrapping_add(y) as u64
        );
    }

    #[test]
    fn concrete_sub(x in any::<u32>(), y in any::<u32>()) {
        let a = AbstractValue::concrete(32, x as u64);
        let b = AbstractValue::concrete(32, y as u64);
        prop_assert_eq!(
            a.sub(&b).as_concrete().unwrap().value(),
            x.wrapping_sub(y) as u64
        );
    }

    #[test]
    fn concrete_mul(x in any::<u32>(), y in any::<u32>()) {
        let a = AbstractValue::concrete(32, x as u64);
        let b = AbstractValue::concrete(32, y as u64);
        prop_assert_eq!(
            a.mul(&b).as_concrete().unwrap().value(),
            x.wrapping_mul(y) as u64
        );
    }

    #[test]
    fn concrete_bitwise(x in any::<u32>(), y in any::<u32>()) {
        let a = AbstractValue::concrete(32, x as u64);
        let b = AbstractValue::concrete(32, y as u64);
        prop_assert_eq!(a.and(&b).as_concrete().unwrap().value(), (x & y) as u64);
        prop_assert_eq!(a.or(&b).as_concrete().unwrap().value(), (x | y) as u64);
        prop_assert_eq!(a.xor(&b).as_concrete().unwrap().value(), (x ^ y) as u64);
        prop_assert_eq!(a.not().as_concrete().unwrap().value(), (!x) as u64);
    }

    #[test]
    fn concrete_shifts(x in any::<u32>(), n in 0u64..32) {
        let a = AbstractValue::concrete(32, x as u64);
        let amount = AbstractValue::concrete(32, n);
        prop_assert_eq!(
            a.shl(&amount).as_concrete().unwrap().value(),
            (x << n) as u64
        );
        prop_assert_eq!(
            a.shr(&amount).as_concrete().unwrap().value(),
            (x >> n) as u64
        );
        prop_assert_eq!(
            a.sar(&amount).as_concrete().unwrap().value(),
            ((x as i32) >> n) as u32 as u64
        );
    }

    #[test]
    fn concrete_unsigned_division(x in any::<u32>(), y in 1u32..) {
        let a = AbstractValue::concrete(32, x as u64);
        let b = AbstractValue::concrete(32, y as u64);
        prop_assert_eq!(
            a.div_unsigned(&b).as_concrete().unwrap().value(),
            (x / y) as u64
        );
        prop_assert_eq!(
            a.rem_unsigned(&b).as_concrete().unwrap().value(),
            (x % y) as u64
        );
    }

    #[test]
    fn concrete_signed_division(x in any::<i32>(), y in any::<i32>()) {
        prop_assume!(y != 0);
        let a = AbstractValue::concrete(32, x as u32 as u64);
        let b = AbstractValue::concrete(32, y as u32 as u64);
        prop_assert_eq!(
            a.div_signed(&b).as_concrete().unwrap().value(),
            x.wrapping_div(y) as u32 as u64
        );
    }

    #[test]
    fn concrete_comparisons(x in any::<u32>(), y in any::<u32>()) {
        let a = AbstractValue::concrete(32, x as u64);
        let b = AbstractValue::concrete(32, y as u64);
        prop_assert_eq!(a.equal(&b).as_concrete().unwrap().value(), (x == y) as u64);
        prop_assert_eq!(
            a.less_unsigned(&b).as_concrete().unwrap().value(),
            (x < y) as u64
        );
        prop_assert_eq!(
            a.less_signed(&b).as_concrete().unwrap().value(),
            ((x as i32) < (y as i32)) as u64
        );
    }

    #[test]
    fn shift_round_trip(a in arb_value(32), n in 0u64..32) {
        let amount = AbstractValue::concrete(32, n);
        let result = a.shl(&amount).shr(&amount);
        // The top n bits are known zeros.
        let top = if n == 0 { 0 } else { ((1u64 << n) - 1) << (32 - n) };
        prop_assert_eq!(result.zero_bits() & top, top);
        prop_assert_eq!(result.one_bits() & top, 0);
        // The bottom 32-n bits keep their one-possibilities.
        prop_assert_eq!(result.one_bits(), ((a.one_bits() << n) & 0xffff_ffff) >> n);
    }
}

// =============================================================================
// Reaching-definitions laws
// =============================================================================

proptest! {
    #[test]
    fn add_then_kill_leaves_nothing(defs in arb_reaching_defs(), location in arb_location()) {
        let mut defs = defs;
        defs.add_definition(location, TermId(99));
        defs.kill_definitions(location);
        prop_assert!(defs.get_definitions(location).is_empty());
    }

    #[test]
    fn reaching_merge_idempotent(defs in arb_reaching_defs()) {
        let mut merged = defs.clone();
        merged.merge(&defs);
        prop_assert_eq!(merged, defs);
    }

    #[test]
    fn reaching_merge_commutative(a in arb_reaching_defs(), b in arb_reaching_defs()) {
        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn get_definitions_is_covered(defs in arb_reaching_defs(), location in arb_location()) {
        for (chunk, _) in defs.get_definitions(location).iter() {
            prop_assert!(location.covers(chunk));
        }
    }
}
