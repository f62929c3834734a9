//! Record type declarations and the resolved column layout

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{CsvError, Result};
use crate::value::{Value, ValueKind};

/// Schemas resolved so far, one per record type
static SCHEMAS: Lazy<RwLock<HashMap<TypeId, Arc<Schema>>>> = Lazy::new(Default::default);

/// A record type that can be bound from and debound to CSV rows
///
/// Instances start from `Default` when binding; fields whose column is missing from a
/// document keep their default value.
pub trait Tabular: Default + 'static {
    /// Field declarations in declaration order
    fn declare() -> Vec<FieldDecl>;

    /// Read the current value of a declared field, `None` if the name is unknown
    fn get(&self, field: &str) -> Option<Value>;

    /// Store a value into a declared field
    ///
    /// # Errors
    /// - `CsvError::FieldNotFound` if the name is unknown
    /// - Any conversion error from [`FromValue`](crate::FromValue)
    fn set(&mut self, field: &str, value: Value) -> Result<()>;
}

/// Per-field column configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnConfig {
    /// Column name in documents, defaults to the field name
    pub alias: Option<String>,
    /// Excluded from both reading and writing
    pub ignored: bool,
}

/// Declaration of one field of a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub config: ColumnConfig,
}

impl FieldDecl {
    /// Declare a non-nullable field with no alias
    pub fn new(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nullable: false,
            config: ColumnConfig::default(),
        }
    }

    /// Empty text binds to null for this field
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Use `alias` as the column name
    pub fn alias(mut self, alias: &str) -> Self {
        self.config.alias = Some(alias.to_string());
        self
    }

    /// Exclude this field from reading and writing
    pub fn ignored(mut self) -> Self {
        self.config.ignored = true;
        self
    }

    /// Replace the whole column configuration
    pub fn with_config(mut self, config: ColumnConfig) -> Self {
        self.config = config;
        self
    }
}

/// A resolved column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Field name on the record type
    pub name: String,
    /// Column name in documents
    pub alias: String,
    pub nullable: bool,
    pub kind: ValueKind,
}

/// Ordered columns of one record type, ignored fields excluded
///
/// Immutable once resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    /// alias -> column index
    alias_to_field: IndexMap<String, usize>,
    /// field name -> output position
    field_to_position: IndexMap<String, usize>,
    ignored: Vec<String>,
}

impl Schema {
    /// Resolve field declarations into a schema
    ///
    /// # Arguments
    /// - `decls` - Field declarations in declaration order
    ///
    /// # Errors
    /// - `CsvError::DuplicateColumn` if two non-ignored fields share a name or an alias
    ///
    /// # Returns
    /// The schema with its alias and position lookups built
    pub fn resolve<I>(decls: I) -> Result<Self>
    where
        I: IntoIterator<Item = FieldDecl>,
    {
        let mut schema = Schema::default();

        for decl in decls {
            if decl.config.ignored {
                schema.ignored.push(decl.name);
                continue;
            }

            let alias = decl.config.alias.unwrap_or_else(|| decl.name.clone());
            let position = schema.columns.len();

            if schema.field_to_position.contains_key(&decl.name) {
                return Err(CsvError::DuplicateColumn(decl.name));
            }
            if schema.alias_to_field.contains_key(&alias) {
                return Err(CsvError::DuplicateColumn(alias));
            }

            schema.field_to_position.insert(decl.name.clone(), position);
            schema.alias_to_field.insert(alias.clone(), position);
            schema.columns.push(ColumnDescriptor {
                name: decl.name,
                alias,
                nullable: decl.nullable,
                kind: decl.kind,
            });
        }

        Ok(schema)
    }

    /// Get the schema of `T`, resolving it on first use
    ///
    /// Resolved schemas are cached for the lifetime of the process.
    pub fn of<T: Tabular>() -> Result<Arc<Schema>> {
        let id = TypeId::of::<T>();

        if let Some(schema) = SCHEMAS.read().ok().and_then(|m| m.get(&id).cloned()) {
            return Ok(schema);
        }

        let schema = Arc::new(Schema::resolve(T::declare())?);
        debug!(
            record = std::any::type_name::<T>(),
            columns = schema.len(),
            ignored = schema.ignored.len(),
            "resolved schema"
        );

        match SCHEMAS.write() {
            Ok(mut schemas) => Ok(schemas.entry(id).or_insert(schema).clone()),
            Err(_) => Ok(schema),
        }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Column names in output order, as written in a header line
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.alias.as_str())
    }

    /// Names of the declared fields that were ignored
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Look up the column a document column name refers to
    pub fn field_for_alias(&self, alias: &str) -> Option<&ColumnDescriptor> {
        self.alias_to_field.get(alias).map(|&i| &self.columns[i])
    }

    /// Output position of a field
    pub fn position(&self, field: &str) -> Option<usize> {
        self.field_to_position.get(field).copied()
    }
}
