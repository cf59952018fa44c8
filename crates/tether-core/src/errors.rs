use thiserror::Error;

/// Result type alias using TetherError
pub type Result<T> = std::result::Result<T, TetherError>;

/// Coarse classification of persistence errors
///
/// Every error maps to exactly one kind with a stable code, so callers can
/// branch programmatically without matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A record type was declared incorrectly; fatal at schema build or
    /// statement compile time
    Schema,
    /// The backing store rejected or failed a statement
    Store,
    /// The addressed row does not exist (zero rows selected or affected)
    NotFound,
}

impl ErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Schema => "ERR_SCHEMA",
            ErrorKind::Store => "ERR_STORE",
            ErrorKind::NotFound => "ERR_NOT_FOUND",
        }
    }
}

/// Error taxonomy for the persistence layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TetherError {
    // ===== Schema Errors =====
    /// A record type declares no primary-key field
    #[error("record type {type_name} declares no primary-key field")]
    MissingIdField { type_name: String },

    /// A field name appears more than once in a schema declaration
    #[error("record type {type_name} declares field {field} more than once")]
    DuplicateField { type_name: String, field: String },

    /// A to-many field has no inverse to-one field on the target type
    #[error("no to-one field on {target} references {owner} (required as inverse of {owner}.{field})")]
    InverseNotFound {
        owner: String,
        field: String,
        target: String,
    },

    /// More than one to-one field on the target references the owner, so the
    /// inverse of a to-many field cannot be chosen
    #[error("multiple to-one fields on {target} reference {owner}: {candidates:?}")]
    AmbiguousInverse {
        owner: String,
        target: String,
        candidates: Vec<String>,
    },

    /// A relation field was handed a record of a type other than its
    /// declared target
    #[error("relation field {field} on {type_name} does not hold records of type {target}")]
    ReferenceTypeMismatch {
        type_name: String,
        field: String,
        target: String,
    },

    /// A relation operation named a field the record does not declare
    #[error("record type {type_name} has no relation field {field}")]
    UnknownRelationField { type_name: String, field: String },

    /// Two distinct record types share a type name, so the cache entry for
    /// one cannot be checked out as the other
    #[error("cached record under name {type_name} has a different concrete type")]
    TypeCollision { type_name: String },

    // ===== Store Errors =====
    /// Statement or connection failure from the backing store
    #[error("statement failed: {message}")]
    Statement { message: String },

    /// A selected column could not be decoded into its declared kind
    #[error("column {column} on {type_name} could not be decoded: {message}")]
    ColumnDecode {
        type_name: String,
        column: String,
        message: String,
    },

    /// Resolving references while loading a record revisited a record that
    /// is still being loaded
    #[error("reference cycle while loading {type_name} id {id}")]
    ReferenceCycle { type_name: String, id: i64 },

    // ===== NotFound =====
    /// No row with the given primary key
    #[error("no {type_name} row with id {id}")]
    NotFound { type_name: String, id: i64 },
}

impl TetherError {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            TetherError::MissingIdField { .. }
            | TetherError::DuplicateField { .. }
            | TetherError::InverseNotFound { .. }
            | TetherError::AmbiguousInverse { .. }
            | TetherError::ReferenceTypeMismatch { .. }
            | TetherError::UnknownRelationField { .. }
            | TetherError::TypeCollision { .. } => ErrorKind::Schema,
            TetherError::Statement { .. }
            | TetherError::ColumnDecode { .. }
            | TetherError::ReferenceCycle { .. } => ErrorKind::Store,
            TetherError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Whether this is the distinguished missing-row error callers branch on
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
