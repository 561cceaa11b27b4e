use crate::error::{Error, Result};
use crate::model::Question;

/// The outcome of a bulk insert: one result per submitted question, in
/// submission order.
#[derive(Debug)]
pub struct BulkInsertReport {
    results: Vec<Result<Question>>,
}

impl BulkInsertReport {
    pub(crate) fn new(results: Vec<Result<Question>>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[Result<Question>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Result<Question>> {
        self.results
    }

    /// Number of questions submitted.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The questions that were stored.
    pub fn inserted(&self) -> impl Iterator<Item = &Question> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    /// The failed submissions, as (position in the input, cause).
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// True if every question was stored.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }
}
