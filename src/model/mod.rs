pub mod mongodb;
pub mod question;

pub use question::{AnswersEdit, NewQuestion, Question, QuestionCore, QuestionUpdate};
