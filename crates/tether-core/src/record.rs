//! The record model
//!
//! Records are application structs with an `i64` primary key (0 until the
//! first save), scalar fields and relation fields. The [`Record`] trait is
//! the explicit, statically checked surface the store layer drives: static
//! hooks declare the schema and construct instances from rows, and
//! object-safe instance methods expose column values and relation edits so
//! cascades can run on records whose concrete type the engine does not
//! know.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::{Result, TetherError};
use crate::schema::EntitySchema;

// TODO: a derive macro could generate the mechanical Record impls once the
// trait surface settles.

/// Shared handle to a typed record; every holder observes in-place edits
pub type Shared<T> = Rc<RefCell<T>>;

/// Shared handle usable without knowing the concrete record type
pub type SharedDyn = Rc<RefCell<dyn Record>>;

/// Wrap a record in a shared handle
pub fn shared<T: Record>(record: T) -> Shared<T> {
    Rc::new(RefCell::new(record))
}

/// A scalar value bound to or decoded from a statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Null,
}

/// Scalar column values of one selected row, keyed by field name
///
/// Handed to [`Record::from_row`]; relation fields are not present (to-one
/// foreign keys are resolved separately, to-many fields are backed by no
/// column).
#[derive(Debug)]
pub struct Row {
    type_name: &'static str,
    values: HashMap<&'static str, Value>,
}

impl Row {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            values: HashMap::new(),
        }
    }

    pub fn insert(&mut self, field: &'static str, value: Value) {
        self.values.insert(field, value);
    }

    /// Take an integer column value
    ///
    /// # Errors
    ///
    /// Returns `ColumnDecode` if the column is absent, NULL, or not an
    /// integer.
    pub fn integer(&mut self, field: &str) -> Result<i64> {
        match self.values.remove(field) {
            Some(Value::Integer(value)) => Ok(value),
            other => Err(self.decode_error(field, other)),
        }
    }

    /// Take a text column value
    ///
    /// # Errors
    ///
    /// Returns `ColumnDecode` if the column is absent, NULL, or not text.
    pub fn text(&mut self, field: &str) -> Result<String> {
        match self.values.remove(field) {
            Some(Value::Text(value)) => Ok(value),
            other => Err(self.decode_error(field, other)),
        }
    }

    fn decode_error(&self, field: &str, found: Option<Value>) -> TetherError {
        let message = match found {
            Some(value) => format!("unexpected value {:?}", value),
            None => "column absent".to_string(),
        };
        TetherError::ColumnDecode {
            type_name: self.type_name.to_string(),
            column: field.to_string(),
            message,
        }
    }
}

/// A persistable record type
///
/// The static methods declare the schema and build instances from rows; the
/// instance methods are object-safe so the store layer can edit relation
/// fields through `Rc<RefCell<dyn Record>>` handles during cascades.
///
/// Contract: `values()` returns one [`Value`] per stored non-id column, in
/// schema declaration order, with to-one fields contributing the referenced
/// record's id (or `Null` when unset). `from_row` consumes scalar columns
/// only and leaves relation fields empty; the store layer installs resolved
/// references afterwards through `set_reference`.
pub trait Record: Any {
    /// Unique type name; used as the table name and cache namespace
    fn type_name() -> &'static str
    where
        Self: Sized;

    /// Declare the schema for this type
    ///
    /// Must be deterministic: rebuilding yields an identical schema.
    fn schema() -> Result<EntitySchema>
    where
        Self: Sized;

    /// Build an instance from the scalar columns of a selected row
    fn from_row(row: Row) -> Result<Self>
    where
        Self: Sized;

    /// Primary key; 0 means not yet saved
    fn id(&self) -> i64;

    /// Install the store-assigned primary key
    fn set_id(&mut self, id: i64);

    /// Stored non-id column values in schema declaration order
    fn values(&self) -> Vec<Value>;

    /// Current foreign-key id held by a to-one field, if set
    fn reference_id(&self, field: &str) -> Option<i64>;

    /// Install a resolved reference into a to-one field
    ///
    /// # Errors
    ///
    /// Returns `ReferenceTypeMismatch` if the handle does not hold the
    /// declared target type, or `UnknownRelationField` for an undeclared
    /// field.
    fn set_reference(&mut self, field: &str, target: Rc<dyn Any>) -> Result<()>;

    /// Clear a to-one field iff it currently references `target_id`;
    /// returns whether it did
    fn clear_reference_if(&mut self, field: &str, target_id: i64) -> bool;

    /// Handles currently held by a to-many collection field
    fn collection(&self, field: &str) -> Vec<SharedDyn>;

    /// Empty a to-many collection field
    fn clear_collection(&mut self, field: &str);

    /// Append a child to a to-many collection field
    ///
    /// # Errors
    ///
    /// Same conditions as [`Record::set_reference`].
    fn push_to_collection(&mut self, field: &str, child: Rc<dyn Any>) -> Result<()>;

    /// Remove the child with `child_id` from a to-many collection field,
    /// preserving the order of the remaining elements
    fn remove_from_collection(&mut self, field: &str, child_id: i64);
}

/// Two views of one shared allocation: a typed handle for checkout and a
/// dynamic handle for cascade edits
#[derive(Clone)]
pub struct SharedHandle {
    any: Rc<dyn Any>,
    record: SharedDyn,
}

impl SharedHandle {
    pub fn new<T: Record>(record: Shared<T>) -> Self {
        let any: Rc<dyn Any> = record.clone();
        let dynamic: SharedDyn = record;
        Self {
            any,
            record: dynamic,
        }
    }

    /// The dynamic view, for relation edits on records of unknown type
    pub fn record(&self) -> &SharedDyn {
        &self.record
    }

    /// A fresh type-erased handle, for `set_reference`/`push_to_collection`
    pub fn as_any(&self) -> Rc<dyn Any> {
        self.any.clone()
    }

    /// Check the handle out under its concrete type
    pub fn downcast<T: Record>(&self) -> Option<Shared<T>> {
        self.any.clone().downcast::<RefCell<T>>().ok()
    }
}

/// Type-erased construction hooks for one record type
///
/// Captured as monomorphized function pointers at schema-declaration sites,
/// so relation traversal can build and load records of types the engine
/// only knows by name.
#[derive(Clone, Copy)]
pub struct RecordVtable {
    pub type_name: &'static str,
    pub schema: fn() -> Result<EntitySchema>,
    pub construct: fn(Row) -> Result<SharedHandle>,
}

impl RecordVtable {
    pub fn of<T: Record>() -> RecordVtable {
        RecordVtable {
            type_name: T::type_name(),
            schema: T::schema,
            construct: construct_shared::<T>,
        }
    }
}

fn construct_shared<T: Record>(row: Row) -> Result<SharedHandle> {
    let record = T::from_row(row)?;
    Ok(SharedHandle::new(shared(record)))
}
