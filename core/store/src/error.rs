use knowledge_base_schemas::CategoryId;
use rusqlite::ErrorCode;
use thiserror::Error;

use crate::tree::ForestError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("category {0} cannot be its own parent")]
    SelfParent(CategoryId),

    #[error("moving category {category} under {parent} would create a cycle")]
    Cycle {
        category: CategoryId,
        parent: CategoryId,
    },

    #[error("category {0} has child categories; remove or move them first")]
    HasChildren(CategoryId),

    /// Another writer holds the database; the caller may retry.
    #[error("database is busy, retry the request")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("category forest is corrupt: {0}")]
    Forest(#[from] ForestError),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn category_not_found(id: CategoryId) -> Self {
        StoreError::NotFound {
            entity: "category",
            id: id.0,
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::Conflict,
            _ => StoreError::Storage(err),
        }
    }
}
