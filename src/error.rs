use mongodb::bson::{de::Error as BsonDeError, ser::Error as BsonSerError};
use mongodb::error::Error as DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a [`DocumentClient`](crate::client::DocumentClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Mongo(#[from] DbError),
    /// The store refused the request (bad filter, size limit, missing container...).
    #[error("Rejected by store: {0}")]
    Rejected(String),
    /// The store could not be contacted at all.
    #[error("Store unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Question store is not initialized")]
    NotInitialized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Write failed: {0}")]
    Write(#[source] ClientError),
    #[error("Query failed: {0}")]
    Query(#[source] ClientError),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] ClientError),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid language: {0:?}")]
    InvalidLanguage(String),
    #[error(transparent)]
    Serialize(#[from] BsonSerError),
    #[error(transparent)]
    Deserialize(#[from] BsonDeError),
}
