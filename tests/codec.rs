//! Property-based coverage of the two codecs that every property is built
//! from: the affine integer field (full parameter space) and the raw
//! bit-slice read/write the struct layout is built on top of.

use proptest::prelude::*;
use propbus::extended_struct::ExtendedStruct;
use propbus::field::{Field, IntSpec};

/// `2^w - 1` as an `i64`, saturating at `i64::MAX` once `w` would overflow
/// it — `IntSpec` quantises through `i64` regardless of the field's wire
/// width, so a 64-bit unsigned field can only actually round-trip values up
/// to `i64::MAX` through this API.
fn max_for_width(unsigned_width: u32) -> i64 {
    if unsigned_width >= 63 {
        i64::MAX
    } else {
        (1i64 << unsigned_width) - 1
    }
}

/// `-2^w`, saturating at `i64::MIN` for the same reason as [`max_for_width`].
fn min_for_width(signed: bool, unsigned_width: u32) -> i64 {
    if !signed {
        0
    } else if unsigned_width >= 63 {
        i64::MIN
    } else {
        -(1i64 << unsigned_width)
    }
}

fn int_spec_strategy() -> impl Strategy<Value = (IntSpec, i64)> {
    (1u32..=64, any::<bool>())
        .prop_flat_map(|(width, signed)| {
            let unsigned_width = width - u32::from(signed);
            let max = max_for_width(unsigned_width);
            let min = min_for_width(signed, unsigned_width);
            (Just(width), Just(signed), min..=max)
        })
        .prop_map(|(width, signed, q)| (IntSpec { width, base: 0.0, scale: 1.0, signed }, q))
}

fn slice_strategy() -> impl Strategy<Value = (usize, usize, usize, u64)> {
    (1usize..=64)
        .prop_flat_map(|total| (Just(total), 0..=total))
        .prop_flat_map(|(total, a)| (Just(total), Just(a), a..=total))
        .prop_flat_map(|(total, a, b)| {
            let len = b - a;
            let max_val: u64 = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };
            (Just(total), Just(a), Just(b), 0..=max_val)
        })
}

proptest! {
    /// Every `IntField` whose quantised value fits in its declared width
    /// round-trips exactly through `serialize`/`deserialize`, across the
    /// whole legal width range including a single 64-bit field filling an
    /// entire 8-byte payload.
    #[test]
    fn int_field_round_trips_over_full_parameter_space((spec, q) in int_spec_strategy()) {
        let v = q as f64;
        let bytes = spec.serialize(v).unwrap();
        prop_assert_eq!(spec.deserialize(&bytes), v);
    }

    /// One beyond either boundary of the declared width always overflows.
    /// Skipped at a boundary that already sits at `i64::MIN`/`i64::MAX`,
    /// since "one past" isn't representable in the quantised domain at all.
    #[test]
    fn int_field_one_past_either_boundary_overflows((spec, q) in int_spec_strategy()) {
        let unsigned_width = spec.width - u32::from(spec.signed);
        let max = max_for_width(unsigned_width);
        let min = min_for_width(spec.signed, unsigned_width);
        if q == max && max < i64::MAX {
            prop_assert!(spec.serialize((max + 1) as f64).is_err());
        }
        if q == min && min > i64::MIN {
            prop_assert!(spec.serialize((min - 1) as f64).is_err());
        }
    }

    /// Writing `[a, b)` then reading it back yields the written pattern,
    /// and every bit outside `[a, b)` is left exactly as it was.
    #[test]
    fn bit_slice_round_trips_and_leaves_outside_bits_untouched((total, a, b, value) in slice_strategy()) {
        let mut s = ExtendedStruct::new(vec![Field::reserved(total as u32)]).unwrap();
        for i in 0..total {
            s.set_bit(i, i % 2 == 0).unwrap();
        }
        let before: Vec<bool> = (0..total).map(|i| s.get_bit(i).unwrap()).collect();

        s.set_slice_int(a, b, value).unwrap();

        let len = b - a;
        let mask = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };
        let decoded = s.get_slice(a, b);
        let mut decoded_val: u64 = 0;
        for (i, byte) in decoded.iter().enumerate().take(8) {
            decoded_val |= (*byte as u64) << (8 * i);
        }
        prop_assert_eq!(decoded_val, value & mask);

        for i in 0..total {
            if i < a || i >= b {
                prop_assert_eq!(s.get_bit(i).unwrap(), before[i]);
            }
        }
    }
}
