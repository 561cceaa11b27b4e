//! The question store: provisioning of the database and its language
//! containers, and the CRUD surface for questions.

use std::sync::Arc;

use mongodb::bson::Document;
use tokio::sync::RwLock;

use crate::client::{ContainerRef, DocumentClient};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::mongodb::Id;
use crate::model::{AnswersEdit, NewQuestion, Question, QuestionUpdate};

mod bulk;
mod container;
mod language;

pub use bulk::BulkInsertReport;
pub use container::QuestionContainer;
pub use language::{container_name, DEFAULT_LANGUAGE};

/// Default number of inserts a bulk insert keeps in flight.
pub const DEFAULT_BULK_CONCURRENCY: usize = 16;

/// Owns the database and the active language container, and forwards
/// question operations to whichever container is active.
///
/// Repointing the active container with
/// [`select_language_container`](Self::select_language_container) does not
/// affect operations already in flight: each operation works on the container
/// that was active when it started. Callers that want a fixed container
/// regardless of what others select should hold on to a
/// [`QuestionContainer`] from [`container`](Self::container) instead.
pub struct QuestionStore<C> {
    client: Arc<C>,
    database_id: String,
    container_id: String,
    default_language: String,
    bulk_concurrency: usize,
    active: RwLock<Option<QuestionContainer<C>>>,
}

impl<C> QuestionStore<C>
where
    C: DocumentClient,
{
    pub fn new(
        client: Arc<C>,
        database_id: impl Into<String>,
        container_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            database_id: database_id.into(),
            container_id: container_id.into(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
            active: RwLock::new(None),
        }
    }

    pub fn from_config(client: Arc<C>, config: &StoreConfig) -> Self {
        Self::new(client, config.database_id(), config.container_id())
            .with_default_language(config.default_language())
            .with_bulk_concurrency(config.bulk_concurrency())
    }

    /// Set the language whose questions live in the base container.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Set how many inserts a bulk insert keeps in flight (at least one).
    pub fn with_bulk_concurrency(mut self, concurrency: usize) -> Self {
        self.bulk_concurrency = concurrency.max(1);
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    pub fn base_container_id(&self) -> &str {
        &self.container_id
    }

    /// Make sure the database and the base container exist.
    ///
    /// This operation is idempotent; calling it again keeps whichever
    /// container is currently selected.
    pub async fn init(&self) -> Result<()> {
        info!("Setting up database {}...", self.database_id);
        self.client
            .create_database_if_absent(&self.database_id)
            .await
            .map_err(Error::StoreUnavailable)?;
        info!("Setting up container {}...", self.container_id);
        let base = self.provision(self.container_id.clone()).await?;
        let mut active = self.active.write().await;
        if active.is_none() {
            *active = Some(base);
        }
        info!("...question store ready");
        Ok(())
    }

    /// Get a view of the container for `language`, creating it if needed.
    /// The active container is left alone.
    pub async fn container(&self, language: &str) -> Result<QuestionContainer<C>> {
        if self.active.read().await.is_none() {
            return Err(Error::NotInitialized);
        }
        let name = container_name(&self.container_id, &self.default_language, language)?;
        self.provision(name).await
    }

    /// Point all following operations at the container for `language`,
    /// creating it if needed. Returns the name of the now active container.
    pub async fn select_language_container(&self, language: &str) -> Result<String> {
        let container = self.container(language).await?;
        let name = container.name().to_string();
        *self.active.write().await = Some(container);
        info!("Active question container is now {name}");
        Ok(name)
    }

    /// A snapshot of the currently active container.
    pub async fn active_container(&self) -> Result<QuestionContainer<C>> {
        self.active.read().await.clone().ok_or(Error::NotInitialized)
    }

    pub async fn active_container_name(&self) -> Result<String> {
        Ok(self.active_container().await?.name().to_string())
    }

    pub async fn find(&self, filter: Document) -> Result<Vec<Question>> {
        self.active_container().await?.find(filter).await
    }

    pub async fn add_item(&self, item: NewQuestion) -> Result<Question> {
        self.active_container().await?.add_item(item).await
    }

    pub async fn add_items(&self, items: Vec<NewQuestion>) -> Result<BulkInsertReport> {
        Ok(self.active_container().await?.add_items(items).await)
    }

    pub async fn update_item(&self, update: QuestionUpdate) -> Result<Question> {
        self.active_container().await?.update_item(update).await
    }

    pub async fn edit_answers(&self, edit: AnswersEdit) -> Result<Question> {
        self.active_container().await?.edit_answers(edit).await
    }

    pub async fn report_question(&self, id: Id) -> Result<Question> {
        self.active_container().await?.report_question(id).await
    }

    pub async fn like_increase(&self, id: Id) -> Result<Question> {
        self.active_container().await?.like_increase(id).await
    }

    pub async fn get_item(&self, id: Id) -> Result<Option<Question>> {
        self.active_container().await?.get_item(id).await
    }

    pub async fn delete_item(&self, id: Id) -> Result<Question> {
        self.active_container().await?.delete_item(id).await
    }

    async fn provision(&self, name: String) -> Result<QuestionContainer<C>> {
        let location = ContainerRef::new(self.database_id.clone(), name);
        self.client
            .create_container_if_absent(&location)
            .await
            .map_err(Error::StoreUnavailable)?;
        Ok(QuestionContainer::new(
            self.client.clone(),
            location,
            self.bulk_concurrency,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson::{doc, Bson};

    use crate::client::{MemoryClient, MongoClient};
    use crate::model::question::now_millis;
    use crate::TEST_CONTAINER;

    #[tokio::test]
    async fn operations_need_init() {
        let store = QuestionStore::new(Arc::new(MemoryClient::new()), "qna", "questions");
        assert!(matches!(
            store.add_item(NewQuestion::example()).await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(store.find(doc! {}).await, Err(Error::NotInitialized)));
        assert!(matches!(
            store.get_item(Id::new()).await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            store.select_language_container("French").await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn init_fails_when_store_is_down() {
        let client = Arc::new(MemoryClient::new());
        client.set_available(false);
        let store = QuestionStore::new(client.clone(), "qna", "questions");
        assert!(matches!(store.init().await, Err(Error::StoreUnavailable(_))));

        client.set_available(true);
        store.init().await.unwrap();
        assert_eq!(store.active_container_name().await.unwrap(), "questions");
    }

    #[store_test]
    async fn init_is_idempotent(store: QuestionStore<MemoryClient>) {
        store.select_language_container("French").await.unwrap();
        store.init().await.unwrap();
        assert_eq!(
            store.active_container_name().await.unwrap(),
            format!("{TEST_CONTAINER}_French")
        );
        assert_eq!(
            store.client().container_names(store.database_id()),
            vec![TEST_CONTAINER.to_string(), format!("{TEST_CONTAINER}_French")]
        );
    }

    #[store_test]
    async fn add_item_stamps_and_derives(store: QuestionStore<MemoryClient>) {
        let before = now_millis();
        let answered = store.add_item(NewQuestion::example()).await.unwrap();
        assert!(answered.answered);
        assert!(answered.date >= before);
        assert_eq!(answered.like, 0);
        assert_eq!(answered.flag_issue, 0);

        let unanswered = store
            .add_item(NewQuestion::example_unanswered())
            .await
            .unwrap();
        assert!(!unanswered.answered);
        assert_ne!(answered.id, unanswered.id);
    }

    #[store_test]
    async fn get_after_add(store: QuestionStore<MemoryClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        let fetched = store.get_item(added.id).await.unwrap().unwrap();
        assert_eq!(fetched, added);
        assert!(store.get_item(Id::new()).await.unwrap().is_none());
    }

    #[store_test]
    async fn find_filters_questions(store: QuestionStore<MemoryClient>) {
        store.add_item(NewQuestion::example()).await.unwrap();
        store
            .add_item(NewQuestion::example_unanswered())
            .await
            .unwrap();

        assert_eq!(store.find(doc! {}).await.unwrap().len(), 2);
        let answered = store.find(doc! { "answered": true }).await.unwrap();
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].extra.get_str("category").unwrap(), "health");

        assert!(matches!(
            store.find(doc! { "like": { "$bogus": 1 } }).await,
            Err(Error::Query(_))
        ));
    }

    #[store_test]
    async fn like_twice(store: QuestionStore<MemoryClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        store.like_increase(added.id).await.unwrap();
        let liked = store.like_increase(added.id).await.unwrap();
        assert_eq!(liked.like, added.like + 2);
        assert_eq!(store.get_item(added.id).await.unwrap().unwrap().like, 2);
    }

    #[store_test]
    async fn counters_default_from_legacy_nulls(store: QuestionStore<MemoryClient>) {
        let container = store.active_container().await.unwrap();
        let legacy = store
            .client()
            .create_item(
                container.location(),
                doc! { "date": 1_i64, "answers": [], "like": null },
            )
            .await
            .unwrap();
        let id: Id = legacy.get_object_id("_id").unwrap().into();

        assert_eq!(store.like_increase(id).await.unwrap().like, 1);
        assert_eq!(store.report_question(id).await.unwrap().flag_issue, 1);
    }

    #[store_test]
    async fn find_reads_documents_with_double_dates(store: QuestionStore<MemoryClient>) {
        store.add_item(NewQuestion::example()).await.unwrap();
        let container = store.active_container().await.unwrap();
        let legacy = store
            .client()
            .create_item(
                container.location(),
                doc! { "date": 1.6e12, "answers": [], "answered": null },
            )
            .await
            .unwrap();
        let id: Id = legacy.get_object_id("_id").unwrap().into();

        let found = store.find(doc! {}).await.unwrap();
        assert_eq!(found.len(), 2);
        let legacy = store.get_item(id).await.unwrap().unwrap();
        assert_eq!(legacy.date, 1_600_000_000_000);
        assert!(!legacy.answered);
        assert_eq!(store.like_increase(id).await.unwrap().date, 1_600_000_000_000);
    }

    #[store_test]
    async fn malformed_filters_fail_on_any_container(store: QuestionStore<MemoryClient>) {
        assert!(matches!(
            store.find(doc! { "like": { "$bogus": 1 } }).await,
            Err(Error::Query(_))
        ));

        store.add_item(NewQuestion::example()).await.unwrap();
        assert!(matches!(
            store
                .find(doc! { "$and": [{ "answered": false }, { "like": { "$bogus": 1 } }] })
                .await,
            Err(Error::Query(_))
        ));
        assert!(matches!(
            store
                .find(doc! { "$or": [{ "answered": true }, { "like": { "$in": 3 } }] })
                .await,
            Err(Error::Query(_))
        ));
    }

    #[store_test]
    async fn report_missing_question(store: QuestionStore<MemoryClient>) {
        assert!(matches!(
            store.report_question(Id::new()).await,
            Err(Error::NotFound(_))
        ));
        assert!(store.find(doc! {}).await.unwrap().is_empty());
    }

    #[store_test]
    async fn edit_answers_touches_only_answers(store: QuestionStore<MemoryClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        assert_eq!(added.answers.len(), 2);
        store.like_increase(added.id).await.unwrap();
        store.report_question(added.id).await.unwrap();

        let edited = store
            .edit_answers(AnswersEdit {
                id: added.id,
                answers: Vec::new(),
            })
            .await
            .unwrap();
        assert!(!edited.answered);
        assert!(edited.answers.is_empty());
        assert_eq!(edited.sources, added.sources);
        assert_eq!(edited.youtube_links, added.youtube_links);
        assert_eq!(edited.like, 1);
        assert_eq!(edited.flag_issue, 1);
        assert_eq!(edited.extra, added.extra);
        assert_eq!(store.get_item(added.id).await.unwrap().unwrap(), edited);
    }

    #[store_test]
    async fn update_replaces_answers(store: QuestionStore<MemoryClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        store.like_increase(added.id).await.unwrap();
        store.report_question(added.id).await.unwrap();
        let updated = store
            .update_item(QuestionUpdate {
                id: added.id,
                answers: vec![Bson::String("See a doctor.".to_string())],
                sources: Vec::new(),
                youtube_links: vec![Bson::String("https://youtu.be/xyz".to_string())],
            })
            .await
            .unwrap();
        assert!(updated.answered);
        assert_eq!(updated.answers, vec![Bson::String("See a doctor.".to_string())]);
        assert!(updated.sources.is_empty());
        assert_eq!(updated.date, added.date);
        assert_eq!(updated.like, 1);
        assert_eq!(updated.flag_issue, 1);
        assert_eq!(updated.extra, added.extra);
        assert_eq!(store.get_item(added.id).await.unwrap().unwrap(), updated);

        let unanswered = store
            .update_item(QuestionUpdate {
                id: added.id,
                answers: Vec::new(),
                sources: updated.sources.clone(),
                youtube_links: updated.youtube_links.clone(),
            })
            .await
            .unwrap();
        assert!(!unanswered.answered);
        assert!(unanswered.answers.is_empty());
        assert_eq!(unanswered.like, 1);
        assert_eq!(unanswered.extra, added.extra);

        let missing = store
            .update_item(QuestionUpdate {
                id: Id::new(),
                answers: Vec::new(),
                sources: Vec::new(),
                youtube_links: Vec::new(),
            })
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[store_test]
    async fn delete(store: QuestionStore<MemoryClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        let deleted = store.delete_item(added.id).await.unwrap();
        assert_eq!(deleted.id, added.id);
        assert!(store.get_item(added.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_item(added.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[store_test]
    async fn language_containers(store: QuestionStore<MemoryClient>) {
        let name = store.select_language_container("French").await.unwrap();
        assert_eq!(name, format!("{TEST_CONTAINER}_French"));
        let french = store.add_item(NewQuestion::example()).await.unwrap();

        let name = store.select_language_container("English").await.unwrap();
        assert_eq!(name, TEST_CONTAINER);
        assert!(store.get_item(french.id).await.unwrap().is_none());
        assert!(store.find(doc! {}).await.unwrap().is_empty());

        assert!(matches!(
            store.select_language_container("").await,
            Err(Error::InvalidLanguage(_))
        ));
        assert_eq!(store.active_container_name().await.unwrap(), TEST_CONTAINER);
    }

    #[store_test]
    async fn scoped_views_ignore_selection(store: QuestionStore<MemoryClient>) {
        let german = store.container("German").await.unwrap();
        let added = german.add_item(NewQuestion::example()).await.unwrap();

        store.select_language_container("French").await.unwrap();
        assert_eq!(german.name(), format!("{TEST_CONTAINER}_German"));
        assert!(german.get_item(added.id).await.unwrap().is_some());
        assert!(store.get_item(added.id).await.unwrap().is_none());
    }

    #[store_test]
    async fn end_to_end_unanswering(store: QuestionStore<MemoryClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        assert!(added.answered);

        let edited = store
            .edit_answers(AnswersEdit {
                id: added.id,
                answers: Vec::new(),
            })
            .await
            .unwrap();
        assert!(!edited.answered);
        assert_eq!(edited.sources, added.sources);
        assert_eq!(edited.youtube_links, added.youtube_links);
    }

    #[tokio::test]
    async fn bulk_insert_reports_each_item() {
        let client = Arc::new(MemoryClient::with_document_limit(512));
        let store = QuestionStore::new(client, "qna", "questions").with_bulk_concurrency(2);
        store.init().await.unwrap();

        let mut too_big = NewQuestion::example_unanswered();
        too_big.extra.insert("question", "?".repeat(1024));
        let items = vec![
            NewQuestion::example(),
            too_big,
            NewQuestion::example_unanswered(),
        ];
        let report = store.add_items(items).await.unwrap();

        assert_eq!(report.len(), 3);
        assert!(!report.is_complete());
        assert_eq!(report.inserted().count(), 2);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(matches!(failures[0].1, Error::Write(_)));
        assert!(report.results()[0].as_ref().unwrap().answered);
        assert!(!report.results()[2].as_ref().unwrap().answered);
        assert_eq!(store.find(doc! {}).await.unwrap().len(), 2);
    }

    #[store_test]
    async fn live_round_trip(store: QuestionStore<MongoClient>) {
        let added = store.add_item(NewQuestion::example()).await.unwrap();
        let liked = store.like_increase(added.id).await.unwrap();
        assert_eq!(liked.like, 1);
        let found = store.find(doc! { "like": 1 }).await.unwrap();
        assert_eq!(found, vec![liked]);
        store.delete_item(added.id).await.unwrap();
        assert!(matches!(
            store.report_question(added.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
