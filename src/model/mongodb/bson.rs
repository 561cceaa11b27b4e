use std::fmt::{Display, Formatter};
use std::{ops::Deref, str::FromStr};

use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use serde::{de, Deserialize, Deserializer, Serialize};

/// The identifier of a stored document.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(ObjectId);

impl Id {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// A filter document matching exactly this ID.
    pub fn as_doc(&self) -> Document {
        doc! { "_id": self.0 }
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Id {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for Id {
    type Err = mongodb::bson::oid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse::<ObjectId>()?))
    }
}

impl From<ObjectId> for Id {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Deserialize a field that may be absent, `null`, or present, falling back to
/// the type's default for the first two. Use together with `#[serde(default)]`.
pub fn default_on_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Deserialize an integer field written by a client that may have stored it
/// as a double. Whole doubles are accepted, absent and `null` become 0, and
/// anything else is an error. Use together with `#[serde(default)]`.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Bson>::deserialize(deserializer)? {
        None | Some(Bson::Null) => Ok(0),
        Some(Bson::Int32(i)) => Ok(i.into()),
        Some(Bson::Int64(i)) => Ok(i),
        // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
        Some(Bson::Double(d)) if d.fract() == 0.0 && d >= i64::MIN as f64 && d < i64::MAX as f64 => {
            Ok(d as i64)
        }
        Some(other) => Err(de::Error::custom(format!(
            "expected a whole number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson::{from_document, Bson};

    #[derive(Debug, Deserialize)]
    struct Counted {
        #[serde(default, deserialize_with = "default_on_null")]
        count: i64,
    }

    #[test]
    fn null_and_absent_become_default() {
        let absent: Counted = from_document(doc! {}).unwrap();
        assert_eq!(absent.count, 0);

        let null: Counted = from_document(doc! { "count": Bson::Null }).unwrap();
        assert_eq!(null.count, 0);

        let present: Counted = from_document(doc! { "count": 7 }).unwrap();
        assert_eq!(present.count, 7);
    }

    #[derive(Debug, Deserialize)]
    struct Stamped {
        #[serde(default, deserialize_with = "lenient_i64")]
        date: i64,
    }

    #[test]
    fn lenient_integers() {
        let stamped: Stamped = from_document(doc! { "date": 1.6e12 }).unwrap();
        assert_eq!(stamped.date, 1_600_000_000_000);

        let stamped: Stamped = from_document(doc! { "date": 12_i32 }).unwrap();
        assert_eq!(stamped.date, 12);

        let stamped: Stamped = from_document(doc! { "date": Bson::Null }).unwrap();
        assert_eq!(stamped.date, 0);

        let stamped: Stamped = from_document(doc! {}).unwrap();
        assert_eq!(stamped.date, 0);

        assert!(from_document::<Stamped>(doc! { "date": 1.5 }).is_err());
        assert!(from_document::<Stamped>(doc! { "date": "yesterday" }).is_err());
    }

    #[test]
    fn id_round_trips_through_hex() {
        let id = Id::new();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.as_doc(), doc! { "_id": *id });
    }
}
