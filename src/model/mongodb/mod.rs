mod bson;
pub mod errors;

pub use bson::{default_on_null, lenient_i64, Id};
