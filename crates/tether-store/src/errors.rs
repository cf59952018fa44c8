//! Error handling for tether-store
//!
//! Wraps tether-core TetherError with store-specific helpers

use tether_core::errors::TetherError;

/// Result type alias using TetherError
pub type Result<T> = tether_core::errors::Result<T>;

/// Create a store error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> TetherError {
    TetherError::Statement {
        message: err.to_string(),
    }
}
