use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};

use crate::client::{ContainerRef, DocumentClient};
use crate::error::ClientError;
use crate::model::mongodb::Id;

mod filter;

type Container = Vec<Document>;
type Database = HashMap<String, Container>;

/// An in-process [`DocumentClient`].
///
/// Behaves like a single-node document store: databases and containers must
/// be created before use, IDs are assigned on insert, and filters use the
/// MongoDB query language (see [`filter`] for the supported subset). It can
/// also simulate an outage or a per-document size limit.
#[derive(Debug)]
pub struct MemoryClient {
    databases: Mutex<HashMap<String, Database>>,
    available: AtomicBool,
    max_document_bytes: Option<usize>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            max_document_bytes: None,
        }
    }

    /// Reject documents whose BSON encoding is larger than `bytes`.
    pub fn with_document_limit(bytes: usize) -> Self {
        Self {
            max_document_bytes: Some(bytes),
            ..Self::new()
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Names of the containers in a database, sorted.
    pub fn container_names(&self, database: &str) -> Vec<String> {
        let databases = self.lock();
        let mut names: Vec<String> = databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Database>> {
        // Every mutation below completes before it can panic, so a poisoned
        // map is still consistent.
        self.databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), ClientError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Unreachable(
                "in-memory store is offline".to_string(),
            ))
        }
    }

    fn check_size(&self, item: &Document) -> Result<(), ClientError> {
        let Some(limit) = self.max_document_bytes else {
            return Ok(());
        };
        let mut bytes = Vec::new();
        item.to_writer(&mut bytes)
            .map_err(|e| ClientError::Rejected(format!("unencodable document: {e}")))?;
        if bytes.len() > limit {
            return Err(ClientError::Rejected(format!(
                "document of {} bytes exceeds the {limit} byte limit",
                bytes.len()
            )));
        }
        Ok(())
    }

    /// Run `f` against an existing container.
    fn with_container<T>(
        &self,
        container: &ContainerRef,
        f: impl FnOnce(&mut Container) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        self.check_available()?;
        let mut databases = self.lock();
        let items = databases
            .get_mut(&container.database)
            .and_then(|db| db.get_mut(&container.container))
            .ok_or_else(|| ClientError::Rejected(format!("container {container} does not exist")))?;
        f(items)
    }
}

fn has_id(item: &Document, id: &Bson) -> bool {
    item.get("_id") == Some(id)
}

#[async_trait]
impl DocumentClient for MemoryClient {
    async fn create_database_if_absent(&self, database: &str) -> Result<(), ClientError> {
        self.check_available()?;
        self.lock().entry(database.to_string()).or_default();
        Ok(())
    }

    async fn create_container_if_absent(
        &self,
        container: &ContainerRef,
    ) -> Result<(), ClientError> {
        self.check_available()?;
        let mut databases = self.lock();
        let db = databases.get_mut(&container.database).ok_or_else(|| {
            ClientError::Rejected(format!("database {} does not exist", container.database))
        })?;
        db.entry(container.container.clone()).or_default();
        Ok(())
    }

    async fn create_item(
        &self,
        container: &ContainerRef,
        item: Document,
    ) -> Result<Document, ClientError> {
        self.check_size(&item)?;
        self.with_container(container, |items| {
            let id = item
                .get("_id")
                .cloned()
                .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
            if items.iter().any(|existing| has_id(existing, &id)) {
                return Err(ClientError::Rejected(format!(
                    "duplicate key {id} in {container}"
                )));
            }
            let mut stored = Document::new();
            stored.insert("_id", id);
            for (key, value) in item {
                if key != "_id" {
                    stored.insert(key, value);
                }
            }
            items.push(stored.clone());
            Ok(stored)
        })
    }

    async fn read_item(
        &self,
        container: &ContainerRef,
        id: &Id,
    ) -> Result<Option<Document>, ClientError> {
        let id = Bson::ObjectId(**id);
        self.with_container(container, |items| {
            Ok(items.iter().find(|item| has_id(item, &id)).cloned())
        })
    }

    async fn replace_item(
        &self,
        container: &ContainerRef,
        filter: Document,
        replacement: Document,
    ) -> Result<bool, ClientError> {
        self.check_size(&replacement)?;
        self.with_container(container, |items| {
            filter::validate(&filter)?;
            let mut target = None;
            for (index, item) in items.iter().enumerate() {
                if filter::matches(&filter, item)? {
                    target = Some(index);
                    break;
                }
            }
            let Some(index) = target else {
                return Ok(false);
            };
            let id = items[index].get("_id").cloned().unwrap_or(Bson::Null);
            if let Some(new_id) = replacement.get("_id") {
                if *new_id != id {
                    return Err(ClientError::Rejected(
                        "the _id field cannot be changed by a replace".to_string(),
                    ));
                }
            }
            let mut stored = Document::new();
            stored.insert("_id", id);
            for (key, value) in replacement {
                if key != "_id" {
                    stored.insert(key, value);
                }
            }
            items[index] = stored;
            Ok(true)
        })
    }

    async fn delete_item(&self, container: &ContainerRef, id: &Id) -> Result<bool, ClientError> {
        let id = Bson::ObjectId(**id);
        self.with_container(container, |items| {
            let before = items.len();
            items.retain(|item| !has_id(item, &id));
            Ok(items.len() < before)
        })
    }

    async fn query(
        &self,
        container: &ContainerRef,
        filter: Document,
    ) -> Result<Vec<Document>, ClientError> {
        self.with_container(container, |items| {
            filter::validate(&filter)?;
            let mut found = Vec::new();
            for item in items.iter() {
                if filter::matches(&filter, item)? {
                    found.push(item.clone());
                }
            }
            Ok(found)
        })
    }
}
