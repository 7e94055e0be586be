//! The polymorphic unit the registry manipulates: three closed kinds behind
//! one `PropertyImpl` enum and a shared `Property` trait for the parts of
//! the contract (serialize/deserialize) that read identically regardless
//! of kind.

use std::collections::HashMap;

use crate::error::{FieldError, PropertyError};
use crate::extended_struct::ExtendedStruct;
use crate::field::{Field, FieldInput, FieldValue};

/// What every property kind can do without knowing which kind it is.
pub trait Property {
    fn serialize(&self) -> Vec<u8>;
    fn deserialize(&mut self, data: &[u8]) -> Result<(), PropertyError>;
}

/// What a caller may write into a property through the registry's
/// `set`/`handle_mut`-free path.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyInput<'a> {
    /// A full tuple replace for a `StructProperty`.
    Tuple(Vec<f64>),
    /// `{name: value}` for an `ExtendedStructProperty`; keys absent from
    /// the schema are silently ignored.
    Fields(Vec<(&'a str, FieldInput<'a>)>),
}

/// A read-only snapshot of a property's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Tuple(Vec<f64>),
    Fields(HashMap<&'static str, FieldValue>),
}

/// A placeholder kind with no payload. Exists so a test-only entry can live
/// in the registry without a real codec.
#[derive(Debug, Clone, Default)]
pub struct BaseProperty;

impl Property for BaseProperty {
    fn serialize(&self) -> Vec<u8> {
        Vec::new()
    }

    fn deserialize(&mut self, _data: &[u8]) -> Result<(), PropertyError> {
        Ok(())
    }
}

/// A fixed tuple of byte-aligned scalar fields, reusing the same affine
/// integer codec as `ExtendedStruct` fields but with no name/bit-packing —
/// the Rust analogue of packing a Python `struct` format string.
#[derive(Debug, Clone)]
pub struct StructProperty {
    fields: Vec<Field>,
    value: Option<Vec<u8>>,
    byte_length: usize,
}

impl StructProperty {
    pub fn new(fields: Vec<Field>) -> Self {
        let byte_length = fields.iter().map(|f| (f.bit_width() as usize).div_ceil(8)).sum();
        StructProperty {
            fields,
            value: None,
            byte_length,
        }
    }

    pub fn value(&self) -> Option<Vec<f64>> {
        let bytes = self.value.as_ref()?;
        let mut offset = 0;
        let mut out = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let width = (field.bit_width() as usize).div_ceil(8);
            let slice = &bytes[offset..offset + width];
            out.push(match &field.kind {
                crate::field::FieldKind::Int(spec) => spec.deserialize(slice),
                crate::field::FieldKind::Bool => (slice.first().copied().unwrap_or(0) & 1) as f64,
                _ => 0.0,
            });
            offset += width;
        }
        Some(out)
    }

    /// Encodes `tuple` eagerly so `serialize` itself never fails — overflow
    /// is surfaced here, to the caller of the local write, instead of
    /// silently at the next transmit.
    pub fn set_value(&mut self, tuple: &[f64]) -> Result<(), FieldError> {
        if tuple.len() != self.fields.len() {
            return Err(FieldError::WrongLength);
        }
        let mut bytes = Vec::with_capacity(self.byte_length);
        for (field, v) in self.fields.iter().zip(tuple) {
            let encoded = match &field.kind {
                crate::field::FieldKind::Int(spec) => spec.serialize(*v)?,
                crate::field::FieldKind::Bool => vec![(*v != 0.0) as u8],
                _ => return Err(FieldError::UnknownField),
            };
            bytes.extend_from_slice(&encoded);
        }
        self.value = Some(bytes);
        Ok(())
    }
}

impl Property for StructProperty {
    fn serialize(&self) -> Vec<u8> {
        self.value.clone().unwrap_or_default()
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<(), PropertyError> {
        if data.len() != self.byte_length {
            return Err(PropertyError::Field(FieldError::WrongLength));
        }
        self.value = Some(data.to_vec());
        Ok(())
    }
}

/// Wraps an [`ExtendedStruct`]; by-name assignment writes only the keys
/// present in the input, ignoring the rest.
#[derive(Debug, Clone)]
pub struct ExtendedStructProperty {
    inner: ExtendedStruct,
}

impl ExtendedStructProperty {
    pub fn new(fields: Vec<Field>) -> Result<Self, FieldError> {
        Ok(ExtendedStructProperty {
            inner: ExtendedStruct::new(fields)?,
        })
    }

    pub fn inner(&self) -> &ExtendedStruct {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut ExtendedStruct {
        &mut self.inner
    }

    pub fn set_fields(&mut self, fields: &[(&str, FieldInput<'_>)]) -> Result<(), FieldError> {
        for (name, value) in fields {
            if self.inner.field_names().any(|n| n == *name) {
                self.inner.set_field(name, *value)?;
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> HashMap<&'static str, FieldValue> {
        self.inner
            .field_names()
            .map(|name| (name, self.inner.get_field(name).expect("field_names() only yields known names")))
            .collect()
    }
}

impl Property for ExtendedStructProperty {
    fn serialize(&self) -> Vec<u8> {
        self.inner.as_bytes().to_vec()
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<(), PropertyError> {
        self.inner.set_bytes(data)?;
        Ok(())
    }
}

/// The closed set of property kinds a [`crate::registry::PropertyRegistry`]
/// can hold, dispatched by `match` rather than `Box<dyn Property>`: there's
/// no plugin surface for new kinds, so the indirection would buy nothing.
#[derive(Debug, Clone)]
pub enum PropertyImpl {
    Base(BaseProperty),
    Struct(StructProperty),
    ExtendedStruct(ExtendedStructProperty),
}

impl PropertyImpl {
    /// Writes `input` into the underlying property. `Ok(())` means the
    /// registry should enqueue this entry for send and mark it `Local`;
    /// `Err` means no state changed.
    ///
    /// `NotAMapping` covers an `ExtendedStructProperty` given a `Tuple`
    /// instead of by-name `Fields`. `WrongArity` covers everything else:
    /// a `StructProperty` given a tuple of the wrong length, or any
    /// property given an input shape it has no use for at all (e.g. a
    /// `BaseProperty`, which accepts neither).
    pub fn set_value(&mut self, input: PropertyInput<'_>) -> Result<(), PropertyError> {
        match (self, input) {
            (PropertyImpl::Struct(p), PropertyInput::Tuple(tuple)) => p.set_value(&tuple).map_err(|e| match e {
                FieldError::WrongLength => PropertyError::WrongArity,
                other => PropertyError::Field(other),
            }),
            (PropertyImpl::ExtendedStruct(p), PropertyInput::Fields(fields)) => Ok(p.set_fields(&fields)?),
            (PropertyImpl::ExtendedStruct(_), PropertyInput::Tuple(_)) => Err(PropertyError::NotAMapping),
            _ => Err(PropertyError::WrongArity),
        }
    }

    /// A read-only snapshot, for kinds that don't support the mutable
    /// handle path. `ExtendedStructProperty` mutation goes through
    /// `PropertyRegistry::handle_mut` instead, since only that path can
    /// flag a local update on in-place writes.
    pub fn value(&self) -> Option<PropertyValue> {
        match self {
            PropertyImpl::Base(_) => None,
            PropertyImpl::Struct(p) => p.value().map(PropertyValue::Tuple),
            PropertyImpl::ExtendedStruct(p) => Some(PropertyValue::Fields(p.snapshot())),
        }
    }
}

impl Property for PropertyImpl {
    fn serialize(&self) -> Vec<u8> {
        match self {
            PropertyImpl::Base(p) => p.serialize(),
            PropertyImpl::Struct(p) => p.serialize(),
            PropertyImpl::ExtendedStruct(p) => p.serialize(),
        }
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<(), PropertyError> {
        match self {
            PropertyImpl::Base(p) => p.deserialize(data),
            PropertyImpl::Struct(p) => p.deserialize(data),
            PropertyImpl::ExtendedStruct(p) => p.deserialize(data),
        }
    }
}
