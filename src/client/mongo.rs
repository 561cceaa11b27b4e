use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::Error as DbError,
    Client, Collection, Database,
};

use crate::client::{ContainerRef, DocumentClient};
use crate::error::ClientError;
use crate::model::mongodb::{errors, Id};

/// A [`DocumentClient`] backed by a MongoDB deployment. Containers map to
/// collections.
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    /// Wrap an existing driver client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Parse the connection string and build a client. This does not contact
    /// the server; connectivity is checked by
    /// [`DocumentClient::create_database_if_absent`].
    pub async fn with_uri_str(uri: &str) -> Result<Self, ClientError> {
        let client = Client::with_uri_str(uri).await.map_err(classify)?;
        Ok(Self::new(client))
    }

    /// Drop a whole database. Used to clean up after tests.
    pub async fn drop_database(&self, database: &str) -> Result<(), ClientError> {
        self.database(database).drop(None).await.map_err(classify)
    }

    fn database(&self, name: &str) -> Database {
        self.client.database(name)
    }

    fn collection(&self, container: &ContainerRef) -> Collection<Document> {
        self.database(&container.database)
            .collection(&container.container)
    }
}

/// Sort driver errors into the ones that mean "could not talk to the server".
fn classify(err: DbError) -> ClientError {
    if errors::is_connectivity_error(&err) {
        ClientError::Unreachable(err.to_string())
    } else {
        ClientError::Mongo(err)
    }
}

#[async_trait]
impl DocumentClient for MongoClient {
    async fn create_database_if_absent(&self, database: &str) -> Result<(), ClientError> {
        // MongoDB materialises databases with their first collection, so the
        // best we can do here is prove the server answers.
        self.database(database)
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn create_container_if_absent(
        &self,
        container: &ContainerRef,
    ) -> Result<(), ClientError> {
        let db = self.database(&container.database);
        let existing = db
            .list_collection_names(doc! { "name": container.container.as_str() })
            .await
            .map_err(classify)?;
        if existing.iter().any(|name| name == &container.container) {
            return Ok(());
        }

        debug!("Creating collection {container}");
        match db.create_collection(&container.container, None).await {
            Ok(()) => Ok(()),
            // Lost a race with another creator; the collection is there either way.
            Err(e) if errors::is_namespace_exists_error(&e) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }

    async fn create_item(
        &self,
        container: &ContainerRef,
        mut item: Document,
    ) -> Result<Document, ClientError> {
        let result = self
            .collection(container)
            .insert_one(&item, None)
            .await
            .map_err(|e| {
                if errors::is_duplicate_key_error(&e) {
                    ClientError::Rejected(format!("duplicate key in {container}: {e}"))
                } else {
                    classify(e)
                }
            })?;
        if let Bson::ObjectId(_) = result.inserted_id {
            item.insert("_id", result.inserted_id);
            Ok(item)
        } else {
            Err(ClientError::Rejected(format!(
                "unexpected ID type {:?} in {container}",
                result.inserted_id.element_type()
            )))
        }
    }

    async fn read_item(
        &self,
        container: &ContainerRef,
        id: &Id,
    ) -> Result<Option<Document>, ClientError> {
        self.collection(container)
            .find_one(id.as_doc(), None)
            .await
            .map_err(classify)
    }

    async fn replace_item(
        &self,
        container: &ContainerRef,
        filter: Document,
        replacement: Document,
    ) -> Result<bool, ClientError> {
        let result = self
            .collection(container)
            .replace_one(filter, replacement, None)
            .await
            .map_err(classify)?;
        Ok(result.matched_count == 1)
    }

    async fn delete_item(&self, container: &ContainerRef, id: &Id) -> Result<bool, ClientError> {
        let result = self
            .collection(container)
            .delete_one(id.as_doc(), None)
            .await
            .map_err(classify)?;
        Ok(result.deleted_count == 1)
    }

    async fn query(
        &self,
        container: &ContainerRef,
        filter: Document,
    ) -> Result<Vec<Document>, ClientError> {
        let cursor = self
            .collection(container)
            .find(filter, None)
            .await
            .map_err(classify)?;
        cursor.try_collect().await.map_err(classify)
    }
}
