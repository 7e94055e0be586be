//! A C-bitfield-like struct that packs named fields into a shared byte
//! buffer with no padding, and lets you read and write them by name, by
//! single bit, or by half-open bit-slice.

use std::collections::HashMap;

use crate::bitbuf::{bitmask, shift_left, shift_right};
use crate::error::FieldError;
use crate::field::{Field, FieldInput, FieldKind, FieldValue};

#[derive(Debug, Clone, Copy)]
struct Slice {
    start: usize,
    stop: usize,
}

impl Slice {
    fn len(self) -> usize {
        self.stop - self.start
    }
}

/// An ordered list of named bitfields over a single byte buffer.
#[derive(Debug, Clone)]
pub struct ExtendedStruct {
    fields: Vec<Field>,
    /// `(slice, index into `fields`)` per named (non-reserved) field.
    layout: HashMap<&'static str, (Slice, usize)>,
    bit_length: usize,
    buf: Vec<u8>,
}

impl ExtendedStruct {
    /// Walks `fields` once, recording each one's bit offset. Fails if two
    /// non-reserved fields share a name.
    pub fn new(fields: Vec<Field>) -> Result<Self, FieldError> {
        let mut layout = HashMap::new();
        let mut bit_length = 0usize;

        for (index, field) in fields.iter().enumerate() {
            let width = field.bit_width() as usize;
            let slice = Slice {
                start: bit_length,
                stop: bit_length + width,
            };
            bit_length += width;

            if field.is_reserved() {
                continue;
            }
            if layout.insert(field.name, (slice, index)).is_some() {
                return Err(FieldError::UnknownField);
            }
        }

        let byte_length = bit_length.div_ceil(8);
        Ok(ExtendedStruct {
            fields,
            layout,
            bit_length,
            buf: vec![0u8; byte_length],
        })
    }

    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    pub fn byte_length(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Overwrites the whole buffer. Fails if `data` isn't exactly
    /// `byte_length()` bytes.
    pub fn set_bytes(&mut self, data: &[u8]) -> Result<(), FieldError> {
        if data.len() != self.buf.len() {
            return Err(FieldError::WrongLength);
        }
        self.buf.copy_from_slice(data);
        Ok(())
    }

    /// Names of every non-reserved field, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| !f.is_reserved()).map(|f| f.name)
    }

    // ---- bit-indexed access -------------------------------------------------

    pub fn get_bit(&self, i: usize) -> Result<bool, FieldError> {
        if i >= self.bit_length {
            return Err(FieldError::OutOfRange);
        }
        Ok((self.buf[i / 8] >> (i % 8)) & 1 == 1)
    }

    pub fn set_bit(&mut self, i: usize, v: bool) -> Result<(), FieldError> {
        if i >= self.bit_length {
            return Err(FieldError::OutOfRange);
        }
        if v {
            self.buf[i / 8] |= 1 << (i % 8);
        } else {
            self.buf[i / 8] &= !(1 << (i % 8));
        }
        Ok(())
    }

    // ---- bit-slice access ---------------------------------------------------

    fn clamp_slice(&self, start: usize, stop: usize) -> Slice {
        Slice {
            start: start.min(self.bit_length),
            stop: stop.min(self.bit_length),
        }
    }

    /// Reads `[start, stop)` as a little-endian bitfield, returned as the
    /// minimal byte buffer covering `stop - start` bits.
    ///
    /// Fetches whole bytes from `start_byte`; since `start` need not be
    /// byte-aligned, the fetched span must cover `start_offset + len` bits,
    /// not just `len` bits, or a field whose own width rounds to fewer
    /// bytes than its *offset* pushes it into would silently lose its top
    /// bits once shifted.
    pub fn get_slice(&self, start: usize, stop: usize) -> Vec<u8> {
        let slice = self.clamp_slice(start, stop);
        let start_byte = slice.start / 8;
        let start_offset = slice.start % 8;
        let len = slice.len();
        let span_bits = start_offset + len;
        let span_bytes = span_bits.div_ceil(8);

        let mut data = self.buf[start_byte..start_byte + span_bytes].to_vec();
        let valid_bits_in_last_byte = span_bits - (span_bytes - 1) * 8;
        if valid_bits_in_last_byte < 8 {
            if let Some(last) = data.last_mut() {
                *last &= 0xFFu8 >> (8 - valid_bits_in_last_byte);
            }
        }
        shift_right(&mut data, start_offset);
        data.truncate(len.div_ceil(8));
        data
    }

    /// Writes `[start, stop)` from a little-endian integer.
    pub fn set_slice_int(&mut self, start: usize, stop: usize, mut value: u64) -> Result<(), FieldError> {
        let slice = self.clamp_slice(start, stop);
        let len = slice.len();
        let byte_len = len.div_ceil(8);
        let mut data = vec![0u8; byte_len];
        let mut i = 0;
        while value != 0 && i < data.len() {
            data[i] = (value & 0xFF) as u8;
            value >>= 8;
            i += 1;
        }
        self.write_slice_bytes(slice, &data)
    }

    /// Writes `[start, stop)` verbatim from a byte buffer (truncated or
    /// zero-padded to the slice's length, matching the reference
    /// semantics of "taken from the source up to the target length").
    pub fn set_slice_bytes(&mut self, start: usize, stop: usize, value: &[u8]) -> Result<(), FieldError> {
        let slice = self.clamp_slice(start, stop);
        let byte_len = slice.len().div_ceil(8);
        let mut data = vec![0u8; byte_len];
        let copy_len = value.len().min(byte_len);
        data[..copy_len].copy_from_slice(&value[..copy_len]);
        self.write_slice_bytes(slice, &data)
    }

    /// `data` is `ceil(slice.len() / 8)` bytes of unshifted little-endian
    /// value. Before merging, it's copied into a buffer sized to
    /// `bitmask`'s length (`ceil((len + start_offset) / 8)` bytes) so that
    /// shifting left by `start_offset` cannot push bits off the end of a
    /// too-small scratch buffer and lose them.
    fn write_slice_bytes(&mut self, slice: Slice, data: &[u8]) -> Result<(), FieldError> {
        let start_byte = slice.start / 8;
        let start_offset = slice.start % 8;
        let mask = bitmask(slice.len(), start_offset);

        let mut shifted = vec![0u8; mask.len()];
        shifted[..data.len()].copy_from_slice(data);
        shift_left(&mut shifted, start_offset);

        for i in 0..shifted.len() {
            self.buf[start_byte + i] &= !mask[i];
            self.buf[start_byte + i] |= shifted[i] & mask[i];
        }
        Ok(())
    }

    // ---- by-name access -----------------------------------------------------

    fn lookup(&self, name: &str) -> Result<(Slice, &Field), FieldError> {
        let (slice, index) = self.layout.get(name).copied().ok_or(FieldError::UnknownField)?;
        Ok((slice, &self.fields[index]))
    }

    pub fn get_field(&self, name: &str) -> Result<FieldValue, FieldError> {
        let (slice, field) = self.lookup(name)?;
        let data = self.get_slice(slice.start, slice.stop);
        Ok(match &field.kind {
            FieldKind::Bool => FieldValue::Bool(data.first().map(|b| b & 1 == 1).unwrap_or(false)),
            FieldKind::Int(spec) => FieldValue::Number(spec.deserialize(&data)),
            FieldKind::Enum(spec) => spec.decode(&data),
            FieldKind::Reserved { .. } => unreachable!("reserved fields are never in `layout`"),
        })
    }

    pub fn set_field(&mut self, name: &str, value: FieldInput<'_>) -> Result<(), FieldError> {
        let (slice, field) = self.lookup(name)?;
        let (start, stop) = (slice.start, slice.stop);
        match (&field.kind, value) {
            (FieldKind::Bool, FieldInput::Bool(b)) => self.set_slice_int(start, stop, b as u64),
            (FieldKind::Bool, FieldInput::Number(n)) => self.set_slice_int(start, stop, (n != 0.0) as u64),
            (FieldKind::Int(spec), FieldInput::Number(n)) => {
                let bytes = spec.serialize(n)?;
                self.set_slice_bytes(start, stop, &bytes)
            }
            (FieldKind::Enum(spec), FieldInput::Label(label)) => {
                let bytes = spec.encode_label(label)?;
                self.set_slice_bytes(start, stop, &bytes)
            }
            (FieldKind::Enum(spec), FieldInput::Number(n)) => {
                let int_spec = crate::field::IntSpec {
                    width: spec.width,
                    base: 0.0,
                    scale: 1.0,
                    signed: false,
                };
                let bytes = int_spec.serialize(n)?;
                self.set_slice_bytes(start, stop, &bytes)
            }
            _ => Err(FieldError::UnknownField),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn bools(names: &'static [&'static str]) -> ExtendedStruct {
        let fields = names.iter().map(|n| Field::bool(n)).collect();
        ExtendedStruct::new(fields).unwrap()
    }

    #[test]
    fn duplicate_field_name_fails_construction() {
        let fields = vec![Field::bool("a"), Field::bool("a")];
        assert!(ExtendedStruct::new(fields).is_err());
    }

    #[test]
    fn bit_slice_assign_and_read_from_original_reference_example() {
        let mut s = bools(&["1a", "1b", "1c", "1d", "1e", "1f", "1g", "1h", "2a", "2b", "2c", "2d", "2e", "2f", "2g", "2h"]);

        s.set_slice_int(0, 7, 0xFFFF).unwrap();
        assert_eq!(s.as_bytes(), &[0x7F, 0x00]);
        assert_eq!(s.get_slice(0, 7), vec![0x7F]);
        assert_eq!(s.get_slice(4, 8), vec![0x7]);

        s.set_slice_int(0, 16, 0xFFFF).unwrap();
        assert_eq!(s.as_bytes(), &[0xFF, 0xFF]);
        assert_eq!(s.get_slice(0, 7), vec![0x7F]);
        assert_eq!(s.get_slice(4, 8), vec![0xF]);
        assert_eq!(s.get_slice(0, 16), vec![0xFF, 0xFF]);
        assert_eq!(s.get_slice(8, 16), vec![0xFF]);

        s.set_slice_int(0, 7, 0x0).unwrap();
        assert_eq!(s.as_bytes(), &[0x80, 0xFF]);

        s.set_slice_int(8, 15, 0x0).unwrap();
        assert_eq!(s.as_bytes(), &[0x80, 0x80]);
    }

    #[test]
    fn nibble_fields_pack_into_one_byte() {
        let mut s = ExtendedStruct::new(vec![
            crate::field::Field::int("a", 4, 0.0, 1.0, false),
            crate::field::Field::int("b", 4, 0.0, 1.0, false),
            crate::field::Field::int("c", 4, 0.0, 1.0, false),
            crate::field::Field::int("d", 4, 0.0, 1.0, false),
        ])
        .unwrap();
        s.set_slice_int(0, 4, 1).unwrap();
        s.set_slice_int(4, 8, 2).unwrap();
        s.set_slice_int(8, 12, 3).unwrap();
        s.set_slice_int(12, 16, 4).unwrap();
        assert_eq!(s.as_bytes(), &[0x21, 0x43]);
        assert_eq!(s.get_slice(0, 4), vec![0x1]);
        assert_eq!(s.get_slice(8, 9), vec![0x1]);
        assert_eq!(s.get_slice(13, 14), vec![0x0]);
        assert_eq!(s.get_slice(13, 15), vec![0x2]);
    }

    /// A field whose `start_offset + width` straddles a byte boundary in a
    /// way that `ceil(width / 8)` alone would under-count the bytes needed
    /// to hold it (width 8 at offset 7 needs 2 bytes, not 1).
    #[test]
    fn slice_misaligned_across_byte_boundary_round_trips() {
        let mut s = ExtendedStruct::new(vec![Field::bool("_pad"), Field::int("v", 8, 0.0, 1.0, false)]).unwrap();
        s.set_slice_int(1, 9, 0xAB).unwrap();
        assert_eq!(s.get_slice(1, 9), vec![0xAB]);
        // bit 0 (the padding field) must be untouched by the write.
        assert!(!s.get_bit(0).unwrap());
    }

    #[test]
    fn by_name_bool_access() {
        let mut s = bools(&["1a", "1h"]);
        s.set_field("1a", FieldInput::Bool(true)).unwrap();
        assert_eq!(s.get_slice(0, 8), vec![0x1]);
        s.set_field("1h", FieldInput::Bool(true)).unwrap();
        assert_eq!(s.get_slice(0, 8), vec![0x81]);
    }

    #[test]
    fn int_fields_by_name_round_trip() {
        let mut s = ExtendedStruct::new(vec![
            Field::int("a", 8, 0.0, 1.0, false),
            Field::int("b", 8, 0.0, 1.0, true),
            Field::int("c", 8, -0.1, 0.1, false),
        ])
        .unwrap();
        s.set_field("a", FieldInput::Number(255.0)).unwrap();
        s.set_field("b", FieldInput::Number(-1.0)).unwrap();
        assert_eq!(s.get_slice(0, 16), vec![0xFF, 0xFF]);
        assert_eq!(s.get_field("a").unwrap(), FieldValue::Number(255.0));
        assert_eq!(s.get_field("b").unwrap(), FieldValue::Number(-1.0));

        s.set_field("c", FieldInput::Number(0.0)).unwrap();
        assert_eq!(s.as_bytes()[2], 0x1);
        assert_eq!(s.get_field("c").unwrap(), FieldValue::Number(0.0));
    }

    #[test]
    fn reserved_field_never_surfaced() {
        let s = ExtendedStruct::new(vec![Field::bool("a"), Field::reserved(3), Field::bool("b")]).unwrap();
        assert!(s.get_field("").is_err());
        assert_eq!(s.bit_length(), 5);
        assert_eq!(s.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn out_of_range_bit_index_fails() {
        let s = bools(&["a"]);
        assert_eq!(s.get_bit(1), Err(FieldError::OutOfRange));
    }

    #[test]
    fn wrong_length_set_bytes_fails() {
        let mut s = bools(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        assert_eq!(s.set_bytes(&[0, 0]), Err(FieldError::WrongLength));
        assert!(s.set_bytes(&[0xFF]).is_ok());
    }
}
