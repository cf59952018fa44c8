//! Entity schema declarations
//!
//! The explicit, statically checked replacement for runtime field
//! inspection: each record type declares its table name, primary key,
//! stored columns and relation fields through a builder, and the result is
//! validated once and then never mutated.

use tracing::debug;

use crate::errors::{Result, TetherError};
use crate::record::{Record, RecordVtable};

/// Kind of a stored scalar value; governs parameter binding and row decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Text,
}

impl ValueKind {
    /// Default SQL column type for this kind
    pub fn sql_type(&self) -> &'static str {
        match self {
            ValueKind::Integer => "INTEGER",
            ValueKind::Text => "TEXT",
        }
    }
}

/// A scalar column backing one record field
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Field name, used verbatim as the column name
    pub field: &'static str,
    /// Value kind used when binding and decoding
    pub kind: ValueKind,
    /// SQL type emitted in table creation; defaults from the kind but may
    /// be overridden per column
    pub sql_type: &'static str,
}

/// A many-to-one reference field, backed by an integer foreign-key column
/// named after the field
#[derive(Debug, Clone)]
pub struct ToOneDef {
    pub field: &'static str,
    /// Type name of the referenced record
    pub target: &'static str,
    /// Construction hooks for the referenced type, captured at the
    /// declaration site so the target schema can be built without a
    /// name-to-type registry
    pub target_vtable: fn() -> RecordVtable,
}

// The vtable hook is determined by the target type, and function-pointer
// comparison is unreliable across codegen units; equality goes by name.
impl PartialEq for ToOneDef {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.target == other.target
    }
}

/// A one-to-many collection field, backed by no column; children are found
/// through the inverse to-one field on the target type
#[derive(Debug, Clone)]
pub struct ToManyDef {
    pub field: &'static str,
    /// Type name of the child record
    pub target: &'static str,
    pub target_vtable: fn() -> RecordVtable,
}

impl PartialEq for ToManyDef {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.target == other.target
    }
}

/// One stored column: either a scalar field or a to-one foreign key.
///
/// Kept as a single ordered list so statement text, `Record::values()` and
/// row decoding all agree on column order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredColumn {
    Scalar(ColumnDef),
    Reference(ToOneDef),
}

impl StoredColumn {
    pub fn field(&self) -> &'static str {
        match self {
            StoredColumn::Scalar(def) => def.field,
            StoredColumn::Reference(def) => def.field,
        }
    }
}

/// Compiled schema metadata for one record type
///
/// Built on first use, memoized by the store manager for its lifetime,
/// never mutated after construction. Rebuilding for the same type yields an
/// identical schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    name: &'static str,
    id_field: &'static str,
    stored: Vec<StoredColumn>,
    to_many: Vec<ToManyDef>,
}

impl EntitySchema {
    /// Start declaring a schema for the given type name
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            name,
            id_field: None,
            stored: Vec::new(),
            to_many: Vec::new(),
        }
    }

    /// Type name; used as the table name and the cache namespace
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name of the primary-key field
    pub fn id_field(&self) -> &'static str {
        self.id_field
    }

    /// Stored columns (scalars and to-one foreign keys) in declaration
    /// order, primary key excluded
    pub fn stored(&self) -> &[StoredColumn] {
        &self.stored
    }

    /// To-one reference fields, in declaration order
    pub fn to_one(&self) -> impl Iterator<Item = &ToOneDef> + '_ {
        self.stored.iter().filter_map(|column| match column {
            StoredColumn::Reference(def) => Some(def),
            StoredColumn::Scalar(_) => None,
        })
    }

    /// To-many collection fields, in declaration order
    pub fn to_many(&self) -> &[ToManyDef] {
        &self.to_many
    }

    /// To-one fields whose target is `owner`; used to resolve the inverse
    /// of an owner's to-many field
    pub fn inverse_candidates(&self, owner: &str) -> Vec<&ToOneDef> {
        self.to_one().filter(|def| def.target == owner).collect()
    }
}

/// Builder for [`EntitySchema`]
///
/// Declaration order of `integer`/`text`/`column`/`many_to_one` calls fixes
/// the stored column order; `Record::values()` must produce values in the
/// same order.
pub struct SchemaBuilder {
    name: &'static str,
    id_field: Option<&'static str>,
    stored: Vec<StoredColumn>,
    to_many: Vec<ToManyDef>,
}

impl SchemaBuilder {
    /// Declare the primary-key field; exactly one declaration is required
    pub fn id(mut self, field: &'static str) -> Self {
        self.id_field = Some(field);
        self
    }

    /// Declare an integer column
    pub fn integer(self, field: &'static str) -> Self {
        self.column(field, ValueKind::Integer, ValueKind::Integer.sql_type())
    }

    /// Declare a text column
    pub fn text(self, field: &'static str) -> Self {
        self.column(field, ValueKind::Text, ValueKind::Text.sql_type())
    }

    /// Declare a column with an explicit SQL type, overriding the kind's
    /// default
    pub fn column(mut self, field: &'static str, kind: ValueKind, sql_type: &'static str) -> Self {
        self.stored.push(StoredColumn::Scalar(ColumnDef {
            field,
            kind,
            sql_type,
        }));
        self
    }

    /// Declare a many-to-one reference to `T`, backed by an integer
    /// foreign-key column named after the field
    pub fn many_to_one<T: Record>(mut self, field: &'static str) -> Self {
        self.stored.push(StoredColumn::Reference(ToOneDef {
            field,
            target: T::type_name(),
            target_vtable: RecordVtable::of::<T>,
        }));
        self
    }

    /// Declare a one-to-many collection of `T`, derived through the inverse
    /// to-one field on `T`
    pub fn one_to_many<T: Record>(mut self, field: &'static str) -> Self {
        self.to_many.push(ToManyDef {
            field,
            target: T::type_name(),
            target_vtable: RecordVtable::of::<T>,
        });
        self
    }

    /// Validate and produce the schema
    ///
    /// # Errors
    ///
    /// Returns `MissingIdField` if no primary key was declared, or
    /// `DuplicateField` if a field name appears twice.
    pub fn build(self) -> Result<EntitySchema> {
        let id_field = self.id_field.ok_or_else(|| TetherError::MissingIdField {
            type_name: self.name.to_string(),
        })?;

        let mut seen = vec![id_field];
        let declared = self
            .stored
            .iter()
            .map(StoredColumn::field)
            .chain(self.to_many.iter().map(|def| def.field));
        for field in declared {
            if seen.contains(&field) {
                return Err(TetherError::DuplicateField {
                    type_name: self.name.to_string(),
                    field: field.to_string(),
                });
            }
            seen.push(field);
        }

        debug!(type_name = self.name, "built entity schema");

        Ok(EntitySchema {
            name: self.name,
            id_field,
            stored: self.stored,
            to_many: self.to_many,
        })
    }
}
