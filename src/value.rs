use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::error::{CsvError, Result};

/// Value kinds a column can be declared with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Signed 64-bit integer
    Integer,
    /// `True` / `False`
    Boolean,
    /// Free text, empty string is a valid value
    Text,
    /// Arbitrary-precision base-10 number
    Decimal,
    /// 128-bit identifier in canonical hyphenated hex form
    UniqueId,
    /// Point in time with an explicit offset
    Timestamp,
    /// Symbolic value, matched case-sensitively against the declared enumerators
    Enumeration(Vec<String>),
    /// Kind handled by a codec registered under this name
    Custom(String),
}

impl ValueKind {
    /// Build an enumeration kind from the enumerators of `E`
    pub fn enumeration<E: Enumeration>() -> Self {
        ValueKind::Enumeration(
            E::ENUMERATORS
                .iter()
                .map(|(name, _)| name.to_string())
                .collect(),
        )
    }

    /// Name of this kind for error messages
    pub fn name(&self) -> &str {
        match self {
            ValueKind::Integer => "Integer",
            ValueKind::Boolean => "Boolean",
            ValueKind::Text => "Text",
            ValueKind::Decimal => "Decimal",
            ValueKind::UniqueId => "UniqueId",
            ValueKind::Timestamp => "Timestamp",
            ValueKind::Enumeration(_) => "Enumeration",
            ValueKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed value moving between a record instance and a CSV field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value, formats as empty text
    Null,
    Integer(i64),
    Boolean(bool),
    Text(String),
    Decimal(BigDecimal),
    UniqueId(Uuid),
    Timestamp(DateTime<FixedOffset>),
    /// Name of an enumerator
    Enumeration(String),
}

impl Value {
    /// Check if this value is absent
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as integer, if this is an Integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as boolean, if this is a Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string reference, if this is a Text or Enumeration value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) | Value::Enumeration(v) => Some(v),
            _ => None,
        }
    }

    /// Get as decimal reference, if this is a Decimal value
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Value::Decimal(v) => Some(v),
            _ => None,
        }
    }

    /// Get as identifier, if this is a UniqueId value
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::UniqueId(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as timestamp, if this is a Timestamp value
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Integer(_) => "Integer",
            Value::Boolean(_) => "Boolean",
            Value::Text(_) => "Text",
            Value::Decimal(_) => "Decimal",
            Value::UniqueId(_) => "UniqueId",
            Value::Timestamp(_) => "Timestamp",
            Value::Enumeration(_) => "Enumeration",
        }
    }

    fn mismatch(self, expected: &str) -> CsvError {
        CsvError::TypeMismatch {
            expected: expected.to_string(),
            got: self.type_name(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Conversion out of a [`Value`], used by record types when binding
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Conversion into a [`Value`], used by record types when debinding
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(v) => Ok(v),
            other => Err(other.mismatch("Integer")),
        }
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| CsvError::format("i32", &v.to_string()))
    }
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(v) => Ok(v),
            other => Err(other.mismatch("Boolean")),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(other.mismatch("Text")),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for BigDecimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(v) => Ok(v),
            other => Err(other.mismatch("Decimal")),
        }
    }
}

impl ToValue for BigDecimal {
    fn to_value(&self) -> Value {
        Value::Decimal(self.clone())
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::UniqueId(v) => Ok(v),
            other => Err(other.mismatch("UniqueId")),
        }
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::UniqueId(*self)
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            other => Err(other.mismatch("Timestamp")),
        }
    }
}

impl ToValue for DateTime<FixedOffset> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        DateTime::<FixedOffset>::from_value(value).map(|v| v.with_timezone(&Utc))
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(self.fixed_offset())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

/// A fieldless enum whose variants are written by name
///
/// Usually implemented through the [`enumeration!`](crate::enumeration) macro
pub trait Enumeration: Sized + Copy + 'static {
    /// Every enumerator with its symbolic name, in declaration order
    const ENUMERATORS: &'static [(&'static str, Self)];

    /// Symbolic name of this enumerator
    fn name(&self) -> &'static str;

    /// Look up an enumerator by its exact name
    fn from_name(name: &str) -> Option<Self> {
        Self::ENUMERATORS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// Convert an Enumeration (or Text) value into the enumerator of `E` with that name
pub fn enum_from_value<E: Enumeration>(value: Value) -> Result<E> {
    match value {
        Value::Enumeration(name) | Value::Text(name) => {
            E::from_name(&name).ok_or_else(|| CsvError::format("Enumeration", &name))
        }
        other => Err(other.mismatch("Enumeration")),
    }
}

/// Declare a fieldless enum usable as an Enumeration column
///
/// ```rust
/// lib_csv_bind::enumeration! {
///     #[derive(Default)]
///     pub enum Level {
///         #[default]
///         Low,
///         High,
///     }
/// }
///
/// use lib_csv_bind::Enumeration;
/// assert_eq!(Level::from_name("High"), Some(Level::High));
/// assert_eq!(Level::default().name(), "Low");
/// ```
#[macro_export]
macro_rules! enumeration {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::Enumeration for $name {
            const ENUMERATORS: &'static [(&'static str, Self)] =
                &[$((stringify!($variant), $name::$variant)),+];

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl $crate::FromValue for $name {
            fn from_value(value: $crate::Value) -> $crate::Result<Self> {
                $crate::value::enum_from_value(value)
            }
        }

        impl $crate::ToValue for $name {
            fn to_value(&self) -> $crate::Value {
                $crate::Value::Enumeration($crate::Enumeration::name(self).to_string())
            }
        }
    };
}
