//! Tether core - schema declarations, the record model, errors and logging
//!
//! Provides:
//! - Error taxonomy with stable kinds and codes
//! - Logging facility built on tracing
//! - Explicit per-type schema declarations (EntitySchema + SchemaBuilder)
//! - The Record trait and shared-handle model consumed by the store layer

pub mod errors;
pub mod logging;
pub mod record;
pub mod schema;

// Re-export key types
pub use errors::{ErrorKind, Result, TetherError};
pub use record::{shared, Record, RecordVtable, Row, Shared, SharedDyn, SharedHandle, Value};
pub use schema::{ColumnDef, EntitySchema, SchemaBuilder, StoredColumn, ToManyDef, ToOneDef, ValueKind};
