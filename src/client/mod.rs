//! The boundary between the question store and the document database.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::ClientError;
use crate::model::mongodb::Id;

mod memory;
mod mongo;

pub use memory::MemoryClient;
pub use mongo::MongoClient;

/// The address of a container (collection) inside a database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    pub database: String,
    pub container: String,
}

impl ContainerRef {
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
        }
    }
}

impl Display for ContainerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.database, self.container)
    }
}

/// A client for a document database that stores schema-less documents in
/// named containers.
///
/// Implementations only move documents; all field semantics live in
/// [`crate::store`].
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Make sure the database exists. Idempotent.
    async fn create_database_if_absent(&self, database: &str) -> Result<(), ClientError>;

    /// Make sure the container exists. Idempotent.
    async fn create_container_if_absent(&self, container: &ContainerRef)
        -> Result<(), ClientError>;

    /// Insert a new document, returning it as stored (with its assigned `_id`).
    async fn create_item(
        &self,
        container: &ContainerRef,
        item: Document,
    ) -> Result<Document, ClientError>;

    /// Point-read a document by ID.
    async fn read_item(
        &self,
        container: &ContainerRef,
        id: &Id,
    ) -> Result<Option<Document>, ClientError>;

    /// Overwrite the single document matching `filter` with `replacement`.
    /// Returns whether a document matched.
    async fn replace_item(
        &self,
        container: &ContainerRef,
        filter: Document,
        replacement: Document,
    ) -> Result<bool, ClientError>;

    /// Delete a document by ID. Returns whether a document was removed.
    async fn delete_item(&self, container: &ContainerRef, id: &Id) -> Result<bool, ClientError>;

    /// Run a filter against the container and collect every match.
    async fn query(
        &self,
        container: &ContainerRef,
        filter: Document,
    ) -> Result<Vec<Document>, ClientError>;
}
