use std::ops::{Deref, DerefMut};

use chrono::Utc;
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{default_on_null, lenient_i64, Id};

/// Name of the optimistic-concurrency token stored on every question.
pub const VERSION_FIELD: &str = "_version";

/// Field names owned by this layer. Caller-supplied extra fields with these
/// names are dropped rather than stored alongside the real ones.
const RESERVED_FIELDS: [&str; 10] = [
    "_id",
    "id",
    "date",
    "answered",
    "answers",
    "sources",
    "youtubeLinks",
    "flagIssue",
    "like",
    VERSION_FIELD,
];

/// Core question data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCore {
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub date: i64,
    /// True iff `answers` is non-empty. Only [`QuestionCore::set_answers`] should write this.
    #[serde(default, deserialize_with = "default_on_null")]
    pub answered: bool,
    #[serde(default, deserialize_with = "default_on_null")]
    pub answers: Vec<Bson>,
    #[serde(default, deserialize_with = "default_on_null")]
    pub sources: Vec<Bson>,
    #[serde(default, deserialize_with = "default_on_null")]
    pub youtube_links: Vec<Bson>,
    /// Number of times the question has been reported.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub flag_issue: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub like: i64,
    #[serde(rename = "_version", default, deserialize_with = "lenient_i64")]
    pub version: i64,
    /// Any other fields (question text, category, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Document,
}

impl QuestionCore {
    /// Replace the answers, keeping `answered` in sync.
    pub fn set_answers(&mut self, answers: Vec<Bson>) {
        self.answered = !answers.is_empty();
        self.answers = answers;
    }
}

/// A question from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub question: QuestionCore,
}

impl Deref for Question {
    type Target = QuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

impl DerefMut for Question {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.question
    }
}

/// A question as submitted by a caller, before the store has stamped it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    #[serde(default, deserialize_with = "default_on_null")]
    pub answers: Vec<Bson>,
    #[serde(default, deserialize_with = "default_on_null")]
    pub sources: Vec<Bson>,
    #[serde(default, deserialize_with = "default_on_null")]
    pub youtube_links: Vec<Bson>,
    #[serde(flatten)]
    pub extra: Document,
}

impl NewQuestion {
    /// Turn the submission into storable data created at `date`, with zeroed
    /// counters and a derived `answered` flag.
    pub fn stamp(self, date: i64) -> QuestionCore {
        let mut extra = self.extra;
        for field in RESERVED_FIELDS {
            extra.remove(field);
        }
        let mut core = QuestionCore {
            date,
            answered: false,
            answers: Vec::new(),
            sources: self.sources,
            youtube_links: self.youtube_links,
            flag_issue: 0,
            like: 0,
            version: 0,
            extra,
        };
        core.set_answers(self.answers);
        core
    }
}

/// Replacement answers, sources and links for an existing question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdate {
    pub id: Id,
    #[serde(default, deserialize_with = "default_on_null")]
    pub answers: Vec<Bson>,
    #[serde(default, deserialize_with = "default_on_null")]
    pub sources: Vec<Bson>,
    #[serde(default, deserialize_with = "default_on_null")]
    pub youtube_links: Vec<Bson>,
}

/// Replacement answers for an existing question; nothing else is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswersEdit {
    pub id: Id,
    #[serde(default, deserialize_with = "default_on_null")]
    pub answers: Vec<Bson>,
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
