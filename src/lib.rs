//! # csv-bind
//!
//! A Rust library for reading and writing typed records as CSV documents
//! Every written field is quoted, so documents round-trip without loss
//!
//! ## Quick Start
//!
//! ```rust
//! use lib_csv_bind::{
//!     from_str, to_string, CsvError, FieldDecl, FromValue, Result, Tabular, ToValue, Value,
//!     ValueKind,
//! };
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Message {
//!     id: i64,
//!     text: Option<String>,
//! }
//!
//! impl Tabular for Message {
//!     fn declare() -> Vec<FieldDecl> {
//!         vec![
//!             FieldDecl::new("id", ValueKind::Integer).alias("Id"),
//!             FieldDecl::new("text", ValueKind::Text).alias("Message").nullable(),
//!         ]
//!     }
//!
//!     fn get(&self, field: &str) -> Option<Value> {
//!         match field {
//!             "id" => Some(self.id.to_value()),
//!             "text" => Some(self.text.to_value()),
//!             _ => None,
//!         }
//!     }
//!
//!     fn set(&mut self, field: &str, value: Value) -> Result<()> {
//!         match field {
//!             "id" => self.id = FromValue::from_value(value)?,
//!             "text" => self.text = FromValue::from_value(value)?,
//!             _ => return Err(CsvError::FieldNotFound(field.to_string())),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let items = vec![Message { id: 1, text: Some("hi".to_string()) }];
//! let text = to_string(&items).unwrap();
//! assert_eq!(text, "\"Id\",\"Message\"\r\n\"1\",\"hi\"\r\n");
//!
//! let back: Vec<Message> = from_str(&text).unwrap();
//! assert_eq!(back, items);
//! ```
//!
//! ## Features
//!
//! - Quote-aware tokenizer accepting `\r`, `\n` and `\r\n` line breaks
//! - Columns matched by alias, so header order in a document does not matter
//! - Integer, Boolean, Text, Decimal, UniqueId, Timestamp and Enumeration kinds, nullable or not
//! - Custom kinds through a codec registry
//! - UTF-8, Shift-JIS and Windows-1252 documents

pub mod bind;
pub mod codec;
pub mod error;
pub mod io;
pub mod schema;
pub mod tokenizer;
pub mod value;

pub use crate::bind::{bind, debind, HeaderIndexMap};
pub use crate::codec::{
    escape, escape_opt, format_timestamp, join_line, parse_timestamp, unescape, CodecRegistry,
    ValueCodec,
};
pub use crate::error::{CsvError, Result};
pub use crate::io::{
    from_csv, from_reader, from_str, to_csv, to_string, to_writer, DecodedChars, Encoding,
    Reader, ReaderOptions, Writer, WriterOptions,
};
pub use crate::schema::{ColumnConfig, ColumnDescriptor, FieldDecl, Schema, Tabular};
pub use crate::tokenizer::{read_record, records, Record, Tokenizer};
pub use crate::value::{Enumeration, FromValue, ToValue, Value, ValueKind};
