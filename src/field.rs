//! Bitfield kinds: the vocabulary [`crate::extended_struct::ExtendedStruct`]
//! packs into a byte buffer.
//!
//! The four kinds (bool, reserved padding, affine int, enum) are a closed
//! set fixed at schema-design time, so they're modeled as one `FieldKind`
//! enum with a `Field { name, kind }` wrapper, rather than a trait object
//! per kind — there's no open extension point to justify the indirection,
//! and `match`-based dispatch is both cheaper and simpler to read here.

use crate::error::FieldError;

/// A named bitfield inside an [`crate::extended_struct::ExtendedStruct`].
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub fn bool(name: &'static str) -> Self {
        Field {
            name,
            kind: FieldKind::Bool,
        }
    }

    pub fn reserved(width: u32) -> Self {
        Field {
            name: "",
            kind: FieldKind::Reserved { width },
        }
    }

    pub fn int(name: &'static str, width: u32, base: f64, scale: f64, signed: bool) -> Self {
        Field {
            name,
            kind: FieldKind::Int(IntSpec {
                width,
                base,
                scale,
                signed,
            }),
        }
    }

    pub fn enum_field(name: &'static str, width: u32, labels: &'static [(&'static str, i64)]) -> Self {
        Field {
            name,
            kind: FieldKind::Enum(EnumSpec { width, labels }),
        }
    }

    /// Bit width this field occupies in the struct's layout.
    pub fn bit_width(&self) -> u32 {
        match &self.kind {
            FieldKind::Bool => 1,
            FieldKind::Reserved { width } => *width,
            FieldKind::Int(spec) => spec.width,
            FieldKind::Enum(spec) => spec.width,
        }
    }

    /// Whether this field is ever surfaced through `get_value`/`set_value`.
    /// `ReservedField` consumes width but is never read or written.
    pub fn is_reserved(&self) -> bool {
        matches!(self.kind, FieldKind::Reserved { .. })
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Bool,
    Reserved { width: u32 },
    Int(IntSpec),
    Enum(EnumSpec),
}

#[derive(Debug, Clone, Copy)]
pub struct IntSpec {
    pub width: u32,
    pub base: f64,
    pub scale: f64,
    pub signed: bool,
}

#[derive(Debug, Clone)]
pub struct EnumSpec {
    pub width: u32,
    pub labels: &'static [(&'static str, i64)],
}

/// A decoded field value, and the only shape `set_value`/`get_value` speak
/// for a single field (as opposed to a whole property — see
/// [`crate::property::PropertyValue`]).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    /// The decoded real value of an `Int` field: `base + stored * scale`.
    Number(f64),
    /// An `Enum` field whose stored integer matched a known label.
    Label(&'static str),
    /// An `Enum` field whose stored integer matched no known label — the
    /// raw integer is still surfaced rather than dropped, since a device
    /// running a newer firmware revision may legitimately send a label
    /// this build doesn't know about yet.
    Raw(i64),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Raw(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&'static str> {
        match self {
            FieldValue::Label(s) => Some(s),
            _ => None,
        }
    }
}

/// What a caller may assign into a field through `ExtendedStruct`'s
/// by-name setter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldInput<'a> {
    Bool(bool),
    Number(f64),
    Label(&'a str),
}

impl IntSpec {
    /// `2^w - 1` is the largest magnitude this field's unsigned payload can
    /// hold, where `w = width - 1` when signed, `width` otherwise.
    fn unsigned_width(&self) -> u32 {
        self.width - u32::from(self.signed)
    }

    /// Quantise `v` to the field's stored integer: `round((v - base) / scale)`,
    /// truncating toward zero (the reference behaviour — both encode and
    /// decode must agree, and this crate picks truncation).
    fn quantize(&self, v: f64) -> i64 {
        ((v - self.base) / self.scale) as i64
    }

    fn encode_int(&self, q: i64) -> Result<u64, FieldError> {
        let unsigned_width = self.unsigned_width();
        let limit: u64 = if unsigned_width >= 64 { u64::MAX } else { 1u64 << unsigned_width };

        if !self.signed {
            if q < 0 || (unsigned_width < 64 && (q as u64) >= limit) {
                return Err(FieldError::Overflow);
            }
            return Ok(q as u64);
        }

        if q >= 0 {
            if unsigned_width < 64 && (q as u64) >= limit {
                return Err(FieldError::Overflow);
            }
            Ok(q as u64)
        } else {
            let magnitude = q.unsigned_abs();
            if magnitude > limit {
                return Err(FieldError::Overflow);
            }
            // two's complement in `width` bits
            let modulus = if self.width >= 64 { 0u64 } else { 1u64 << self.width };
            Ok(modulus.wrapping_sub(magnitude))
        }
    }

    /// Encode `v` into `ceil(width/8)` little-endian bytes.
    pub fn serialize(&self, v: f64) -> Result<Vec<u8>, FieldError> {
        let q = self.quantize(v);
        let stored = self.encode_int(q)?;
        let n_bytes = (self.width as usize).div_ceil(8);
        let mut buf = vec![0u8; n_bytes];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = (stored >> (8 * i)) as u8;
        }
        Ok(buf)
    }

    /// Decode `width` little-endian bits (already right-aligned in `data`)
    /// back to a real value.
    pub fn deserialize(&self, data: &[u8]) -> f64 {
        let mut raw: u64 = 0;
        for (i, &byte) in data.iter().enumerate().take(8) {
            raw |= (byte as u64) << (8 * i);
        }
        let mask = if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        };
        raw &= mask;

        let unsigned_width = self.unsigned_width();
        let sign_bit_set = self.signed && (raw >> unsigned_width) & 1 == 1;
        let q: i64 = if sign_bit_set {
            if self.width >= 64 {
                // all 64 bits are already the two's-complement pattern
                raw as i64
            } else {
                (raw as i64) - (1i64 << self.width)
            }
        } else {
            raw as i64
        };

        self.base + (q as f64) * self.scale
    }
}

impl EnumSpec {
    fn as_int_spec(&self) -> IntSpec {
        IntSpec {
            width: self.width,
            base: 0.0,
            scale: 1.0,
            signed: false,
        }
    }

    pub fn encode_label(&self, label: &str) -> Result<Vec<u8>, FieldError> {
        let value = self
            .labels
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, value)| *value)
            .ok_or(FieldError::UnknownField)?;
        self.as_int_spec().serialize(value as f64)
    }

    pub fn decode(&self, data: &[u8]) -> FieldValue {
        let raw = self.as_int_spec().deserialize(data) as i64;
        match self.labels.iter().find(|(_, value)| *value == raw) {
            Some((name, _)) => FieldValue::Label(name),
            None => FieldValue::Raw(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_serialize_deserialize() {
        let bytes = Field::bool("flag");
        assert!(matches!(bytes.kind, FieldKind::Bool));
    }

    #[test]
    fn int_round_trip_unsigned() {
        let spec = IntSpec {
            width: 8,
            base: 0.0,
            scale: 1.0,
            signed: false,
        };
        let bytes = spec.serialize(255.0).unwrap();
        assert_eq!(bytes, vec![0xFF]);
        assert_eq!(spec.deserialize(&bytes), 255.0);
    }

    #[test]
    fn int_round_trip_signed_negative() {
        let spec = IntSpec {
            width: 8,
            base: 0.0,
            scale: 1.0,
            signed: true,
        };
        let bytes = spec.serialize(-1.0).unwrap();
        assert_eq!(bytes, vec![0xFF]);
        assert_eq!(spec.deserialize(&bytes), -1.0);
    }

    #[test]
    fn int_affine_round_trip() {
        // matches the Python reference test: IntField("c", 8, base=-0.1, scale=0.1)
        let spec = IntSpec {
            width: 8,
            base: -0.1,
            scale: 0.1,
            signed: false,
        };
        let bytes = spec.serialize(0.0).unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(spec.deserialize(&bytes), 0.0);

        let bytes = spec.serialize(0.1).unwrap();
        assert_eq!(bytes[0], 2);
        assert!((spec.deserialize(&bytes) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn int_overflow_unsigned() {
        let spec = IntSpec {
            width: 8,
            base: 0.0,
            scale: 1.0,
            signed: false,
        };
        assert_eq!(spec.serialize(256.0), Err(FieldError::Overflow));
        assert_eq!(spec.serialize(-1.0), Err(FieldError::Overflow));
    }

    #[test]
    fn int_overflow_signed_boundary() {
        let spec = IntSpec {
            width: 8,
            base: 0.0,
            scale: 1.0,
            signed: true,
        };
        assert!(spec.serialize(127.0).is_ok());
        assert!(spec.serialize(-128.0).is_ok());
        assert_eq!(spec.serialize(128.0), Err(FieldError::Overflow));
        assert_eq!(spec.serialize(-129.0), Err(FieldError::Overflow));
    }

    #[test]
    fn field_spanning_byte_boundary() {
        // width 12, same parameters used by the weatherstation wind fields
        let spec = IntSpec {
            width: 12,
            base: 0.0,
            scale: 0.1,
            signed: false,
        };
        let bytes = spec.serialize(40.0).unwrap();
        assert_eq!(spec.deserialize(&bytes), 40.0);
    }

    #[test]
    fn enum_known_and_unknown_label() {
        const LABELS: &[(&str, i64)] = &[("POWER_ON", 0), ("BROWNOUT", 1)];
        let spec = EnumSpec { width: 3, labels: LABELS };
        let bytes = spec.encode_label("BROWNOUT").unwrap();
        assert_eq!(spec.decode(&bytes), FieldValue::Label("BROWNOUT"));

        // value 5 has no matching label
        let raw_bytes = IntSpec {
            width: 3,
            base: 0.0,
            scale: 1.0,
            signed: false,
        }
        .serialize(5.0)
        .unwrap();
        assert_eq!(spec.decode(&raw_bytes), FieldValue::Raw(5));
    }
}
