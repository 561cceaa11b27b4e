//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const NAMESPACE_EXISTS: i32 = 48;
pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    false
}

/// Return true if the given error says the collection being created already exists.
pub fn is_namespace_exists_error(err: &DbError) -> bool {
    if let ErrorKind::Command(ref e) = *err.kind {
        return e.code == NAMESPACE_EXISTS;
    }
    false
}

/// Return true if the error means the server could not be reached, rather than
/// the server rejecting the request.
pub fn is_connectivity_error(err: &DbError) -> bool {
    matches!(*err.kind, ErrorKind::ServerSelection { .. } | ErrorKind::Io(_))
}
