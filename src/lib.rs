//! Data access for question and answer documents kept in a document database.
//!
//! [`store::QuestionStore`] provisions the database and its per-language
//! containers and exposes the question operations; the database itself is
//! reached through a [`client::DocumentClient`].

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate store_test;

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use client::{DocumentClient, MemoryClient, MongoClient};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use model::mongodb::Id;
pub use model::{AnswersEdit, NewQuestion, Question, QuestionUpdate};
pub use store::{BulkInsertReport, QuestionContainer, QuestionStore};

/// Base container used by store tests.
#[cfg(test)]
pub(crate) const TEST_CONTAINER: &str = "questions";

/// Connection string for tests that need a live MongoDB server.
#[cfg(test)]
pub(crate) fn test_db_uri() -> String {
    std::env::var("QNA_TEST_DB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

#[cfg(test)]
pub(crate) fn test_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["qna_store"], None, None);
}
