use std::sync::Arc;

use futures::{stream, StreamExt};
use mongodb::bson::{doc, from_document, to_document, Bson, Document};

use crate::client::{ContainerRef, DocumentClient};
use crate::error::{Error, Result};
use crate::model::mongodb::Id;
use crate::model::question::{now_millis, VERSION_FIELD};
use crate::model::{AnswersEdit, NewQuestion, Question, QuestionCore, QuestionUpdate};
use crate::store::BulkInsertReport;

/// A view of the questions in one container.
///
/// Views are cheap to clone and never change which container they address.
/// Every read-modify-write is a conditional replace on the question's version,
/// so a concurrent change between the read and the write is reported as
/// [`Error::Conflict`] instead of being overwritten.
pub struct QuestionContainer<C> {
    client: Arc<C>,
    location: ContainerRef,
    bulk_concurrency: usize,
}

// `Derive(Clone)` would only derive if `C: Clone`, but we don't need that bound.
impl<C> Clone for QuestionContainer<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            location: self.location.clone(),
            bulk_concurrency: self.bulk_concurrency,
        }
    }
}

impl<C> QuestionContainer<C> {
    pub(crate) fn new(client: Arc<C>, location: ContainerRef, bulk_concurrency: usize) -> Self {
        Self {
            client,
            location,
            bulk_concurrency: bulk_concurrency.max(1),
        }
    }

    /// The container's name.
    pub fn name(&self) -> &str {
        &self.location.container
    }

    pub fn location(&self) -> &ContainerRef {
        &self.location
    }
}

impl<C> QuestionContainer<C>
where
    C: DocumentClient,
{
    /// Run a MongoDB-style filter and return every matching question.
    pub async fn find(&self, filter: Document) -> Result<Vec<Question>> {
        debug!("Querying {} with {filter}", self.location);
        let documents = self
            .client
            .query(&self.location, filter)
            .await
            .map_err(Error::Query)?;
        documents
            .into_iter()
            .map(|document| from_document(document).map_err(Error::from))
            .collect()
    }

    /// Store a new question, stamping its creation date.
    pub async fn add_item(&self, item: NewQuestion) -> Result<Question> {
        debug!("Adding a question to {}", self.location);
        self.insert(item.stamp(now_millis())).await
    }

    /// Store many questions concurrently. Individual failures do not stop the
    /// others; they are reported per question.
    pub async fn add_items(&self, items: Vec<NewQuestion>) -> BulkInsertReport {
        debug!("Adding {} questions to {}", items.len(), self.location);
        let results = stream::iter(items)
            .map(|item| self.insert(item.stamp(now_millis())))
            .buffered(self.bulk_concurrency)
            .collect::<Vec<_>>()
            .await;
        let report = BulkInsertReport::new(results);
        for (index, err) in report.failures() {
            warn!("Bulk insert into {} failed for item {index}: {err}", self.location);
        }
        report
    }

    /// Replace a question's answers, sources and links. Existing answers are
    /// discarded, not merged.
    pub async fn update_item(&self, update: QuestionUpdate) -> Result<Question> {
        debug!("Updating question {} in {}", update.id, self.location);
        let mut question = self.get_existing(update.id).await?;
        question.set_answers(update.answers);
        question.sources = update.sources;
        question.youtube_links = update.youtube_links;
        self.replace(question).await
    }

    /// Replace only a question's answers.
    pub async fn edit_answers(&self, edit: AnswersEdit) -> Result<Question> {
        debug!("Editing answers of question {} in {}", edit.id, self.location);
        let mut question = self.get_existing(edit.id).await?;
        question.set_answers(edit.answers);
        self.replace(question).await
    }

    /// Count one more report against a question.
    pub async fn report_question(&self, id: Id) -> Result<Question> {
        debug!("Reporting question {id} in {}", self.location);
        let mut question = self.get_existing(id).await?;
        question.flag_issue = question.flag_issue.saturating_add(1);
        self.replace(question).await
    }

    /// Count one more like on a question.
    pub async fn like_increase(&self, id: Id) -> Result<Question> {
        debug!("Liking question {id} in {}", self.location);
        let mut question = self.get_existing(id).await?;
        question.like = question.like.saturating_add(1);
        self.replace(question).await
    }

    pub async fn get_item(&self, id: Id) -> Result<Option<Question>> {
        debug!("Getting question {id} from {}", self.location);
        let document = self
            .client
            .read_item(&self.location, &id)
            .await
            .map_err(Error::Query)?;
        Ok(document.map(from_document::<Question>).transpose()?)
    }

    /// Delete a question, returning what was removed.
    pub async fn delete_item(&self, id: Id) -> Result<Question> {
        debug!("Deleting question {id} from {}", self.location);
        let question = self.get_existing(id).await?;
        let removed = self
            .client
            .delete_item(&self.location, &id)
            .await
            .map_err(Error::Write)?;
        if removed {
            Ok(question)
        } else {
            Err(self.not_found(id))
        }
    }

    async fn insert(&self, question: QuestionCore) -> Result<Question> {
        let document = to_document(&question)?;
        let stored = self
            .client
            .create_item(&self.location, document)
            .await
            .map_err(Error::Write)?;
        Ok(from_document(stored)?)
    }

    async fn get_existing(&self, id: Id) -> Result<Question> {
        self.get_item(id).await?.ok_or_else(|| self.not_found(id))
    }

    /// Write back a question that was read at its current version.
    async fn replace(&self, mut question: Question) -> Result<Question> {
        let filter = version_filter(question.id, question.version);
        question.version += 1;
        let document = to_document(&question)?;
        let replaced = self
            .client
            .replace_item(&self.location, filter, document)
            .await
            .map_err(Error::Write)?;
        if replaced {
            Ok(question)
        } else {
            warn!(
                "Question {} in {} changed while it was being updated",
                question.id, self.location
            );
            Err(Error::Conflict(format!(
                "question {} in {} was modified or removed concurrently",
                question.id, self.location
            )))
        }
    }

    fn not_found(&self, id: Id) -> Error {
        Error::NotFound(format!("question {id} in {}", self.location))
    }
}

/// Match a question only while it is still at `version`. Documents written
/// before versioning have no token and count as version 0.
fn version_filter(id: Id, version: i64) -> Document {
    let mut filter = id.as_doc();
    if version == 0 {
        filter.insert(VERSION_FIELD, doc! { "$in": [0_i64, Bson::Null] });
    } else {
        filter.insert(VERSION_FIELD, version);
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::MemoryClient;
    use crate::store::QuestionStore;

    #[test]
    fn legacy_documents_match_version_zero() {
        let id = Id::new();
        assert_eq!(
            version_filter(id, 0),
            doc! { "_id": *id, "_version": { "$in": [0_i64, null] } }
        );
        assert_eq!(
            version_filter(id, 4),
            doc! { "_id": *id, "_version": 4_i64 }
        );
    }

    #[store_test]
    async fn stale_write_is_a_conflict(store: QuestionStore<MemoryClient>) {
        let container = store.active_container().await.unwrap();
        let added = container.add_item(NewQuestion::example()).await.unwrap();

        // Someone else writes between our read and our write.
        let mut stale = container.get_item(added.id).await.unwrap().unwrap();
        container.like_increase(added.id).await.unwrap();
        stale.like += 10;
        assert!(matches!(
            container.replace(stale).await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(container.get_item(added.id).await.unwrap().unwrap().like, 1);
    }

    #[store_test]
    async fn removed_while_updating_is_a_conflict(store: QuestionStore<MemoryClient>) {
        let container = store.active_container().await.unwrap();
        let added = container.add_item(NewQuestion::example()).await.unwrap();
        let id = added.id;
        container.delete_item(id).await.unwrap();
        assert!(matches!(
            container.replace(added).await,
            Err(Error::Conflict(_))
        ));
        assert!(container.get_item(id).await.unwrap().is_none());
    }
}
