//! Mapping between raw records and typed instances

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::codec::CodecRegistry;
use crate::error::{CsvError, Result};
use crate::schema::{Schema, Tabular};
use crate::tokenizer::Record;
use crate::value::{Value, ValueKind};

/// Column positions of one document, built from its header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderIndexMap {
    /// header cell -> position, including cells no field maps to
    columns: IndexMap<String, usize>,
    /// field name -> position, for cells matching a schema alias
    fields: IndexMap<String, usize>,
}

impl HeaderIndexMap {
    /// Resolve a header row against a schema
    ///
    /// Header cells that match no alias are kept as column names but never populate a
    /// field. When a cell appears twice, the later position wins.
    pub fn build(schema: &Schema, header: &Record) -> Self {
        let mut map = HeaderIndexMap::default();

        for (position, cell) in header.iter().enumerate() {
            if map.columns.insert(cell.to_string(), position).is_some() {
                warn!(column = cell, position, "duplicate header column");
            }
            if let Some(column) = schema.field_for_alias(cell) {
                map.fields.insert(column.name.clone(), position);
            }
        }

        debug!(
            columns = map.columns.len(),
            matched = map.fields.len(),
            "built header index map"
        );
        map
    }

    /// Position of a document column by its header text
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.get(column).copied()
    }

    /// Position of the column bound to a field
    pub fn field_position(&self, field: &str) -> Option<usize> {
        self.fields.get(field).copied()
    }

    /// Header cells in document order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of distinct header cells
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Build an instance of `T` from one record
///
/// # Arguments
/// - `schema` - The schema of `T`
/// - `header` - The header index map of the document the record comes from
/// - `record` - The raw record
/// - `codecs` - Codecs for custom kinds
///
/// # Errors
/// - `CsvError::IndexError` if the record is narrower than a mapped column position
/// - `CsvError::FormatError` / `CsvError::UnsupportedType` from the value codec
/// - Any error returned by [`Tabular::set`]
///
/// # Returns
/// The bound instance; fields without a column in the document keep their default
pub fn bind<T: Tabular>(
    schema: &Schema,
    header: &HeaderIndexMap,
    record: &Record,
    codecs: &CodecRegistry,
) -> Result<T> {
    let mut instance = T::default();

    for column in schema.columns() {
        let Some(position) = header.field_position(&column.name) else {
            continue;
        };

        let text = record.get(position).ok_or(CsvError::IndexError {
            index: position,
            len: record.len(),
        })?;

        let value = if column.nullable && text.is_empty() {
            Value::Null
        } else {
            codecs.parse(&column.kind, text)?
        };

        instance.set(&column.name, value)?;
    }

    trace!(fields = record.len(), "bound record");
    Ok(instance)
}

/// Turn an instance of `T` into field texts
///
/// The output has exactly one entry per schema column, placed by the schema's own
/// positions. Null values become empty text, which only nullable and Text columns
/// can read back.
///
/// # Errors
/// - `CsvError::FieldNotFound` if the instance does not expose a declared field
/// - `CsvError::TypeMismatch` if a non-nullable, non-Text column holds a null
/// - `CsvError::TypeMismatch` / `CsvError::UnsupportedType` from the value codec
pub fn debind<T: Tabular>(schema: &Schema, instance: &T, codecs: &CodecRegistry) -> Result<Vec<String>> {
    let mut fields = vec![String::new(); schema.len()];

    for column in schema.columns() {
        let position = schema
            .position(&column.name)
            .ok_or_else(|| CsvError::FieldNotFound(column.name.clone()))?;
        let value = instance
            .get(&column.name)
            .ok_or_else(|| CsvError::FieldNotFound(column.name.clone()))?;

        if value.is_null() && !column.nullable && !matches!(column.kind, ValueKind::Text) {
            return Err(CsvError::TypeMismatch {
                expected: column.kind.name().to_string(),
                got: value.type_name(),
            });
        }

        fields[position] = codecs.format(&column.kind, &value)?;
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use chrono::{DateTime, FixedOffset};
    use uuid::Uuid;

    use super::*;
    use crate::schema::FieldDecl;
    use crate::value::{FromValue, ToValue, ValueKind};

    crate::enumeration! {
        #[derive(Default)]
        enum Grade {
            #[default]
            A,
            B,
            C,
        }
    }

    #[derive(Debug, Default)]
    struct Strict {
        i: i32,
        b: bool,
        s: String,
        d: BigDecimal,
        g: Uuid,
        dt: DateTime<FixedOffset>,
        e: Grade,
    }

    impl Tabular for Strict {
        fn declare() -> Vec<FieldDecl> {
            vec![
                FieldDecl::new("I", ValueKind::Integer),
                FieldDecl::new("B", ValueKind::Boolean),
                FieldDecl::new("S", ValueKind::Text),
                FieldDecl::new("D", ValueKind::Decimal),
                FieldDecl::new("G", ValueKind::UniqueId),
                FieldDecl::new("DT", ValueKind::Timestamp),
                FieldDecl::new("E", ValueKind::enumeration::<Grade>()),
            ]
        }

        fn get(&self, field: &str) -> Option<Value> {
            Some(match field {
                "I" => self.i.to_value(),
                "B" => self.b.to_value(),
                "S" => self.s.to_value(),
                "D" => self.d.to_value(),
                "G" => self.g.to_value(),
                "DT" => self.dt.to_value(),
                "E" => self.e.to_value(),
                _ => return None,
            })
        }

        fn set(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "I" => self.i = FromValue::from_value(value)?,
                "B" => self.b = FromValue::from_value(value)?,
                "S" => self.s = FromValue::from_value(value)?,
                "D" => self.d = FromValue::from_value(value)?,
                "G" => self.g = FromValue::from_value(value)?,
                "DT" => self.dt = FromValue::from_value(value)?,
                "E" => self.e = FromValue::from_value(value)?,
                _ => return Err(CsvError::FieldNotFound(field.to_string())),
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Loose {
        i: Option<i64>,
        b: Option<bool>,
        s: Option<String>,
        d: Option<BigDecimal>,
        g: Option<Uuid>,
        e: Option<Grade>,
    }

    impl Tabular for Loose {
        fn declare() -> Vec<FieldDecl> {
            vec![
                FieldDecl::new("I", ValueKind::Integer).nullable(),
                FieldDecl::new("B", ValueKind::Boolean).nullable(),
                FieldDecl::new("S", ValueKind::Text).nullable(),
                FieldDecl::new("D", ValueKind::Decimal).nullable(),
                FieldDecl::new("G", ValueKind::UniqueId).nullable(),
                FieldDecl::new("E", ValueKind::enumeration::<Grade>()).nullable(),
            ]
        }

        fn get(&self, field: &str) -> Option<Value> {
            Some(match field {
                "I" => self.i.to_value(),
                "B" => self.b.to_value(),
                "S" => self.s.to_value(),
                "D" => self.d.to_value(),
                "G" => self.g.to_value(),
                "E" => self.e.to_value(),
                _ => return None,
            })
        }

        fn set(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "I" => self.i = FromValue::from_value(value)?,
                "B" => self.b = FromValue::from_value(value)?,
                "S" => self.s = FromValue::from_value(value)?,
                "D" => self.d = FromValue::from_value(value)?,
                "G" => self.g = FromValue::from_value(value)?,
                "E" => self.e = FromValue::from_value(value)?,
                _ => return Err(CsvError::FieldNotFound(field.to_string())),
            }
            Ok(())
        }
    }

    const GUID: &str = "6e917ccc-ae71-479f-91b5-4c01be65e915";
    const STAMP: &str = "2020-04-09T11:57:56.0075565Z";

    fn header_for<T: Tabular>(cells: Vec<&str>) -> (Schema, HeaderIndexMap) {
        let schema = Schema::resolve(T::declare()).unwrap();
        let header = HeaderIndexMap::build(&schema, &Record::from(cells));
        (schema, header)
    }

    #[test]
    fn test_bind_all_kinds() {
        let (schema, header) = header_for::<Strict>(vec!["I", "B", "S", "D", "G", "DT", "E"]);
        let record = Record::from(vec!["10", "True", "a", "1.1", GUID, STAMP, "C"]);
        let actual: Strict = bind(&schema, &header, &record, &CodecRegistry::new()).unwrap();

        assert_eq!(actual.i, 10);
        assert!(actual.b);
        assert_eq!(actual.s, "a");
        assert_eq!(actual.d, BigDecimal::from_str("1.1").unwrap());
        assert_eq!(actual.g, Uuid::parse_str(GUID).unwrap());
        assert_eq!(actual.dt, DateTime::parse_from_rfc3339(STAMP).unwrap());
        assert_eq!(actual.e, Grade::C);
    }

    #[test]
    fn test_bind_empty_nullable_fields() {
        let (schema, header) = header_for::<Loose>(vec!["I", "B", "S", "D", "G", "E"]);
        let record = Record::from(vec![""; 6]);
        let actual: Loose = bind(&schema, &header, &record, &CodecRegistry::new()).unwrap();

        assert_eq!(actual.i, None);
        assert_eq!(actual.b, None);
        assert_eq!(actual.s, None);
        assert_eq!(actual.d, None);
        assert_eq!(actual.g, None);
        assert_eq!(actual.e, None);
    }

    #[test]
    fn test_bind_empty_text_is_empty_string() {
        let (schema, header) = header_for::<Strict>(vec!["S"]);
        let actual: Strict = bind(&schema, &header, &Record::from(vec![""]), &CodecRegistry::new()).unwrap();
        assert_eq!(actual.s, "");
    }

    #[test]
    fn test_bind_empty_non_nullable_integer_fails() {
        let (schema, header) = header_for::<Strict>(vec!["I"]);
        let result = bind::<Strict>(&schema, &header, &Record::from(vec![""]), &CodecRegistry::new());
        assert!(matches!(result, Err(CsvError::FormatError { .. })));
    }

    #[test]
    fn test_bind_by_alias_not_position() {
        let (schema, header) = header_for::<Loose>(vec!["S", "Reserved", "I"]);
        let record = Record::from(vec!["hello", "x", "1"]);
        let actual: Loose = bind(&schema, &header, &record, &CodecRegistry::new()).unwrap();

        assert_eq!(actual.i, Some(1));
        assert_eq!(actual.s.as_deref(), Some("hello"));
        assert_eq!(actual.b, None);
        assert_eq!(header.position("Reserved"), Some(1));
        assert_eq!(header.field_position("Reserved"), None);
    }

    #[test]
    fn test_bind_narrow_row() {
        let (schema, header) = header_for::<Loose>(vec!["I", "S"]);
        let result = bind::<Loose>(&schema, &header, &Record::from(vec!["1"]), &CodecRegistry::new());
        assert!(matches!(result, Err(CsvError::IndexError { index: 1, len: 1 })));
    }

    #[test]
    fn test_duplicate_header_last_wins() {
        let (schema, header) = header_for::<Loose>(vec!["I", "I"]);
        assert_eq!(header.len(), 1);
        let actual: Loose = bind(&schema, &header, &Record::from(vec!["1", "2"]), &CodecRegistry::new()).unwrap();
        assert_eq!(actual.i, Some(2));
    }

    #[test]
    fn test_debind_all_kinds() {
        let schema = Schema::resolve(Strict::declare()).unwrap();
        let instance = Strict {
            i: 10,
            b: true,
            s: "a".to_string(),
            d: BigDecimal::from_str("1.1").unwrap(),
            g: Uuid::parse_str(GUID).unwrap(),
            dt: DateTime::parse_from_rfc3339(STAMP).unwrap(),
            e: Grade::C,
        };

        let actual = debind(&schema, &instance, &CodecRegistry::new()).unwrap();
        assert_eq!(actual, vec!["10", "True", "a", "1.1", GUID, STAMP, "C"]);
    }

    #[test]
    fn test_debind_nulls() {
        let schema = Schema::resolve(Loose::declare()).unwrap();
        let actual = debind(&schema, &Loose::default(), &CodecRegistry::new()).unwrap();
        assert_eq!(actual, vec![""; 6]);
    }

    #[test]
    fn test_debind_bind_debind_is_stable() {
        let schema = Schema::resolve(Strict::declare()).unwrap();
        let codecs = CodecRegistry::new();
        let instance = Strict {
            i: -3,
            s: "quote \" comma , break \r\n".to_string(),
            d: BigDecimal::from_str("-12.500").unwrap(),
            dt: DateTime::parse_from_rfc3339("1999-12-31T23:59:59.123456789-05:00").unwrap(),
            e: Grade::B,
            ..Strict::default()
        };

        let first = debind(&schema, &instance, &codecs).unwrap();
        let header = HeaderIndexMap::build(&schema, &Record::from(schema.aliases().collect::<Vec<_>>()));
        let rebound: Strict = bind(&schema, &header, &Record::from(first.clone()), &codecs).unwrap();
        let second = debind(&schema, &rebound, &codecs).unwrap();
        assert_eq!(first, second);
    }

    #[derive(Debug, Default)]
    struct Mislabeled {
        at: Option<DateTime<FixedOffset>>,
        note: Option<String>,
    }

    impl Tabular for Mislabeled {
        fn declare() -> Vec<FieldDecl> {
            vec![
                FieldDecl::new("At", ValueKind::Timestamp),
                FieldDecl::new("Note", ValueKind::Text),
            ]
        }

        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "At" => Some(self.at.to_value()),
                "Note" => Some(self.note.to_value()),
                _ => None,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "At" => self.at = FromValue::from_value(value)?,
                "Note" => self.note = FromValue::from_value(value)?,
                _ => return Err(CsvError::FieldNotFound(field.to_string())),
            }
            Ok(())
        }
    }

    #[test]
    fn test_debind_null_in_non_nullable_column_fails() {
        let schema = Schema::resolve(Mislabeled::declare()).unwrap();
        let codecs = CodecRegistry::new();

        let result = debind(&schema, &Mislabeled::default(), &codecs);
        assert!(matches!(
            result,
            Err(CsvError::TypeMismatch { ref expected, got: "Null" }) if expected == "Timestamp"
        ));

        let instance = Mislabeled {
            at: Some(DateTime::parse_from_rfc3339(STAMP).unwrap()),
            note: None,
        };
        assert_eq!(debind(&schema, &instance, &codecs).unwrap(), vec![STAMP, ""]);
    }
}
