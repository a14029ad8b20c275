use thiserror::Error;

use crate::config::ConfigError;
use crate::cursor::CursorError;
use crate::representation::RepresentationError;
use crate::schema::SchemaError;
use crate::store::StoreError;

/// Errors surfaced by the data manager.
#[derive(Debug, Error)]
pub enum MapperError {
    /// Malformed call, rejected before any store I/O.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another entity already occupies one of the keys this write needs.
    #[error(
        "an object with the same ID or hash-range key already exists in table `{table}`; \
         choose a different ID or key values"
    )]
    UniquenessConflict {
        table: String,
        #[source]
        source: StoreError,
    },

    /// The stored entity moved past the version the caller last observed.
    #[error(
        "version conflict on `{id}` in table `{table}`: attempted version {attempted}, stored version {stored}"
    )]
    VersionConflict {
        table: String,
        id: String,
        attempted: u64,
        stored: u64,
    },

    #[error("object `{id}` could not be found in table `{table}`")]
    NotFound { table: String, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<RepresentationError> for MapperError {
    fn from(err: RepresentationError) -> Self {
        MapperError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        MapperError::Serde(err.to_string())
    }
}

impl MapperError {
    pub fn validation(message: impl Into<String>) -> Self {
        MapperError::Validation(message.into())
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, MapperError::VersionConflict { .. })
    }

    pub fn is_uniqueness_conflict(&self) -> bool {
        matches!(self, MapperError::UniquenessConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MapperError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
