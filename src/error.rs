use core::fmt;

/// Errors raised while registering a property. Fatal to setup; the registry
/// does not exist in a valid state until every `add_property` call succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `can_id` did not fit in 11 bits (`can_id & !0x7FF != 0`).
    InvalidId,
    /// The name was empty, or already used in a different role.
    InvalidName,
    /// Either the CAN ID or the name is already registered.
    DuplicateKey,
    /// The property handed to `add_property` was rejected by its own
    /// constructor (e.g. a duplicate field name inside an `ExtendedStruct`).
    InvalidProperty,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::InvalidId => "CAN ID does not fit in 11 bits",
            ConfigError::InvalidName => "property name is invalid or already used",
            ConfigError::DuplicateKey => "CAN ID or name already registered",
            ConfigError::InvalidProperty => "property failed its own validation",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised while encoding or decoding a single bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// The quantised value did not fit in the field's declared width.
    Overflow,
    /// A byte buffer handed to `deserialize` was the wrong length.
    WrongLength,
    /// A bit index or bit-slice fell outside the struct's declared length.
    OutOfRange,
    /// A field name was not found in the struct's layout table.
    UnknownField,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FieldError::Overflow => "quantised value overflows field width",
            FieldError::WrongLength => "wrong byte length for field",
            FieldError::OutOfRange => "bit index or slice out of range",
            FieldError::UnknownField => "unknown field name",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for FieldError {}

/// Errors raised while assigning or decoding a [`crate::property::Property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    /// Propagated from the underlying bitfield codec.
    Field(FieldError),
    /// A `Tuple` input was given to an `ExtendedStructProperty`, which can
    /// only be assigned by name through a `Fields` input.
    NotAMapping,
    /// Either a `Tuple` input had the wrong number of elements for a
    /// `StructProperty`, or the input's shape has no meaning at all for
    /// the target property kind (e.g. any input given to a `BaseProperty`,
    /// or `Fields` given to a `StructProperty`).
    WrongArity,
    /// No property is registered under the given name or CAN ID.
    UnknownProperty,
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyError::Field(e) => write!(f, "{e}"),
            PropertyError::NotAMapping => f.write_str("input shape does not match property kind"),
            PropertyError::WrongArity => f.write_str("tuple has the wrong number of fields"),
            PropertyError::UnknownProperty => f.write_str("no property registered under that name"),
        }
    }
}

impl std::error::Error for PropertyError {}

impl From<FieldError> for PropertyError {
    fn from(e: FieldError) -> Self {
        PropertyError::Field(e)
    }
}
