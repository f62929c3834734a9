//! Per-kind parse and format rules, plus field escaping
//!
//! Every built-in [`ValueKind`] has a fixed grammar. [`ValueKind::Custom`] kinds are
//! looked up in a [`CodecRegistry`], and a kind with nothing registered fails with
//! `CsvError::UnsupportedType`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use uuid::Uuid;

use crate::error::{CsvError, Result};
use crate::tokenizer::Tokenizer;
use crate::value::{Value, ValueKind};

/// Layouts tried after RFC 3339 and RFC 2822 for text carrying an explicit offset.
/// `%Y` also takes the signed years written for dates outside 0000-9999.
const ZONED_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
];

/// Layouts for text without an offset, interpreted as UTC
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse and format rules for a custom value kind
pub trait ValueCodec: Send + Sync {
    /// Parse non-empty field text into a value
    fn parse(&self, text: &str) -> Result<Value>;

    /// Format a non-null value into field text
    fn format(&self, value: &Value) -> Result<String>;
}

/// Codecs for custom kinds, keyed by kind name
///
/// Built-in kinds are always available, so the default registry is empty.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    custom: HashMap<String, Arc<dyn ValueCodec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.custom.keys()).finish()
    }
}

impl CodecRegistry {
    /// Create a registry with only the built-in kinds
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec for `ValueKind::Custom(name)`, replacing any previous one
    pub fn register<C: ValueCodec + 'static>(&mut self, name: &str, codec: C) -> &mut Self {
        self.custom.insert(name.to_string(), Arc::new(codec));
        self
    }

    /// Builder-style variant of [`CodecRegistry::register`]
    pub fn with<C: ValueCodec + 'static>(mut self, name: &str, codec: C) -> Self {
        self.register(name, codec);
        self
    }

    /// Check whether values of `kind` can be parsed and formatted
    pub fn supports(&self, kind: &ValueKind) -> bool {
        match kind {
            ValueKind::Custom(name) => self.custom.contains_key(name),
            _ => true,
        }
    }

    fn custom(&self, name: &str) -> Result<&Arc<dyn ValueCodec>> {
        self.custom
            .get(name)
            .ok_or_else(|| CsvError::UnsupportedType(name.to_string()))
    }

    /// Parse field text as a value of `kind`
    ///
    /// Empty text is only valid for Text, where it is the empty string. Callers handle
    /// nullable columns before reaching this point.
    ///
    /// # Errors
    /// - `CsvError::FormatError` if the text does not match the kind's grammar
    /// - `CsvError::UnsupportedType` if `kind` is a custom kind with no codec
    pub fn parse(&self, kind: &ValueKind, text: &str) -> Result<Value> {
        match kind {
            ValueKind::Integer => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| CsvError::format(kind.name(), text)),
            ValueKind::Boolean => parse_bool(text).map(Value::Boolean),
            ValueKind::Text => Ok(Value::Text(text.to_string())),
            ValueKind::Decimal => BigDecimal::from_str(text.trim())
                .map(Value::Decimal)
                .map_err(|_| CsvError::format(kind.name(), text)),
            ValueKind::UniqueId => Uuid::parse_str(text.trim())
                .map(Value::UniqueId)
                .map_err(|_| CsvError::format(kind.name(), text)),
            ValueKind::Timestamp => parse_timestamp(text).map(Value::Timestamp),
            ValueKind::Enumeration(enumerators) => {
                if enumerators.iter().any(|e| e == text) {
                    Ok(Value::Enumeration(text.to_string()))
                } else {
                    Err(CsvError::format(kind.name(), text))
                }
            }
            ValueKind::Custom(name) => self.custom(name)?.parse(text),
        }
    }

    /// Format a value of `kind` as field text
    ///
    /// # Errors
    /// - `CsvError::TypeMismatch` if the value does not belong to `kind`
    /// - `CsvError::FormatError` if an enumeration value is not a declared enumerator
    /// - `CsvError::UnsupportedType` if `kind` is a custom kind with no codec
    pub fn format(&self, kind: &ValueKind, value: &Value) -> Result<String> {
        match (kind, value) {
            (_, Value::Null) => Ok(String::new()),
            (ValueKind::Integer, Value::Integer(v)) => Ok(v.to_string()),
            (ValueKind::Boolean, Value::Boolean(v)) => Ok(format_bool(*v).to_string()),
            (ValueKind::Text, Value::Text(v)) => Ok(v.clone()),
            (ValueKind::Decimal, Value::Decimal(v)) => Ok(v.to_string()),
            (ValueKind::UniqueId, Value::UniqueId(v)) => Ok(v.hyphenated().to_string()),
            (ValueKind::Timestamp, Value::Timestamp(v)) => Ok(format_timestamp(v)),
            (ValueKind::Enumeration(enumerators), Value::Enumeration(v)) => {
                if enumerators.contains(v) {
                    Ok(v.clone())
                } else {
                    Err(CsvError::format(kind.name(), v))
                }
            }
            (ValueKind::Custom(name), value) => self.custom(name)?.format(value),
            (kind, value) => Err(CsvError::TypeMismatch {
                expected: kind.name().to_string(),
                got: value.type_name(),
            }),
        }
    }
}

fn parse_bool(text: &str) -> Result<bool> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(CsvError::format("Boolean", text))
    }
}

fn format_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Parse any supported timestamp representation
///
/// Text without an offset is taken as UTC; a bare date is midnight UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>> {
    let s = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt);
    }
    let zoned = s.strip_suffix('Z').map(|t| format!("{t}+00:00"));
    for layout in ZONED_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(zoned.as_deref().unwrap_or(s), layout) {
            return Ok(dt);
        }
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(s, layout) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc().fixed_offset());
            }
        }
    }

    Err(CsvError::format("Timestamp", text))
}

/// Format a timestamp in the canonical round-trip form
///
/// Seven fractional digits, then `Z` for a zero offset or `+HH:MM` otherwise,
/// e.g. `2020-04-09T11:57:56.0075565Z`.
pub fn format_timestamp(dt: &DateTime<FixedOffset>) -> String {
    let ticks = dt.nanosecond() % 1_000_000_000 / 100;
    let zone = if dt.offset().local_minus_utc() == 0 {
        "Z".to_string()
    } else {
        dt.format("%:z").to_string()
    };
    format!("{}.{:07}{}", dt.format("%Y-%m-%dT%H:%M:%S"), ticks, zone)
}

/// Wrap a field in double quotes, doubling every embedded quote
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Escape an optional field, an absent one becomes `""`
pub fn escape_opt(text: Option<&str>) -> String {
    escape(text.unwrap_or_default())
}

/// Escape every field and join them with `,` (no line terminator)
pub fn join_line<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`escape`]: read `text` as exactly one field
///
/// # Errors
/// - `CsvError::FieldCount` if the text holds zero or several fields
/// - `CsvError::UnterminatedQuotedField` if a quote is left open
pub fn unescape(text: &str) -> Result<String> {
    let mut tokenizer = Tokenizer::from_text(text);
    let mut fields = match tokenizer.next_record()? {
        Some(record) => record.into_fields(),
        None => Vec::new(),
    };
    while let Some(record) = tokenizer.next_record()? {
        fields.extend(record);
    }

    if fields.len() != 1 {
        return Err(CsvError::FieldCount {
            expected: 1,
            got: fields.len(),
        });
    }
    Ok(fields.remove(0))
}
