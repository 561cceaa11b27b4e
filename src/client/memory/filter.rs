//! Evaluation of MongoDB-style filter documents against in-memory documents.
//!
//! Supported: implicit equality (including "array contains"), dotted paths,
//! `$and`/`$or`/`$nor`, and the field operators `$eq`, `$ne`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$in`, `$nin`, `$exists` and `$size`. Anything else is
//! rejected the way a server would reject a malformed query, before any
//! document is looked at.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use crate::error::ClientError;

/// Reject a malformed filter up front, whether or not any document would
/// reach the offending clause.
pub fn validate(filter: &Document) -> Result<(), ClientError> {
    for (key, condition) in filter {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                for clause in clauses(key, condition)? {
                    validate(clause)?;
                }
            }
            op if op.starts_with('$') => {
                return Err(rejected(format!("unknown top level operator: {op}")))
            }
            _ => validate_condition(condition)?,
        }
    }
    Ok(())
}

fn validate_condition(condition: &Bson) -> Result<(), ClientError> {
    let Bson::Document(operators) = condition else {
        return Ok(());
    };
    if !is_operator_document(condition) {
        return Ok(());
    }
    for (op, operand) in operators {
        match (op.as_str(), operand) {
            ("$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte", _) => {}
            ("$in" | "$nin", Bson::Array(_)) => {}
            ("$in" | "$nin", _) => return Err(rejected(format!("{op} needs an array"))),
            ("$exists", Bson::Boolean(_)) => {}
            ("$exists", _) => return Err(rejected("$exists needs a boolean".to_string())),
            ("$size", size) if as_f64(size).is_some() => {}
            ("$size", _) => return Err(rejected("$size needs a number".to_string())),
            (other, _) => return Err(rejected(format!("unknown operator: {other}"))),
        }
    }
    Ok(())
}

/// Check whether `document` matches `filter`.
pub fn matches(filter: &Document, document: &Document) -> Result<bool, ClientError> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => clauses(key, condition)?
                .iter()
                .try_fold(true, |acc, f| Ok::<_, ClientError>(acc && matches(f, document)?))?,
            "$or" => clauses(key, condition)?
                .iter()
                .try_fold(false, |acc, f| Ok::<_, ClientError>(acc || matches(f, document)?))?,
            "$nor" => !clauses(key, condition)?
                .iter()
                .try_fold(false, |acc, f| Ok::<_, ClientError>(acc || matches(f, document)?))?,
            op if op.starts_with('$') => {
                return Err(rejected(format!("unknown top level operator: {op}")))
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The sub-filters of a logical operator.
fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>, ClientError> {
    let array = match condition {
        Bson::Array(array) if !array.is_empty() => array,
        _ => return Err(rejected(format!("{op} must be a nonempty array"))),
    };
    array
        .iter()
        .map(|clause| match clause {
            Bson::Document(doc) => Ok(doc),
            _ => Err(rejected(format!("{op} entries must be documents"))),
        })
        .collect()
}

/// Resolve a dotted path. Numeric segments index into arrays.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(array) => array.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(doc) => doc.keys().next().map_or(false, |k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool, ClientError> {
    if !is_operator_document(condition) {
        return Ok(equals(value, condition));
    }
    let Bson::Document(operators) = condition else {
        unreachable!("checked by is_operator_document");
    };
    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(op, value, operand)?,
            "$nin" => !in_list(op, value, operand)?,
            "$exists" => match operand {
                Bson::Boolean(should_exist) => value.is_some() == *should_exist,
                _ => return Err(rejected("$exists needs a boolean".to_string())),
            },
            "$size" => {
                let wanted = as_f64(operand)
                    .ok_or_else(|| rejected("$size needs a number".to_string()))?;
                matches!(value, Some(Bson::Array(a)) if a.len() as f64 == wanted)
            }
            other => return Err(rejected(format!("unknown operator: {other}"))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with MongoDB's rules: a missing field equals `null`, and an array
/// field matches if it equals the operand or contains it.
fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match value {
        None => matches!(operand, Bson::Null),
        Some(value) => {
            same(value, operand)
                || matches!(value, Bson::Array(items) if items.iter().any(|i| same(i, operand)))
        }
    }
}

fn in_list(op: &str, value: Option<&Bson>, operand: &Bson) -> Result<bool, ClientError> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|c| equals(value, c))),
        _ => Err(rejected(format!("{op} needs an array"))),
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let scalar = |v: &Bson| order(v, operand).map_or(false, &accept);
    match value {
        Bson::Array(items) => items.iter().any(scalar),
        other => scalar(other),
    }
}

fn same(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Order two values of comparable type; `None` when the types differ.
fn order(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn rejected(message: String) -> ClientError {
    ClientError::Rejected(message)
}
