//! Record structure for ZQL.
//!
//! A `Record` is the row type of record queries: an ordered map from field
//! name to `Value`. The `id` field carries the primary-key identity used by
//! joins, group-bys and compaction.

use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the primary-key field.
pub const ID_FIELD: &str = "id";

/// A record: named fields with values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Gets a top-level field.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Gets a field by dotted path, descending into nested records
    /// (`"issue.priority"`). A path without dots is a plain `get`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.as_record()?.fields.get(part)?;
        }
        Some(current)
    }

    /// Like `get_path`, but a missing field is an error.
    pub fn require(&self, path: &str) -> Result<&Value> {
        self.get_path(path)
            .ok_or_else(|| Error::FieldNotFound(path.to_string()))
    }

    /// Returns true if the record has the top-level field.
    #[inline]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the `id` field.
    #[inline]
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD)
    }

    /// String identity of this record (its `id` rendered as text).
    pub fn identity(&self) -> String {
        self.id().map(|v| v.to_string()).unwrap_or_default()
    }

    /// Returns a record holding only the given fields (missing ones are skipped).
    pub fn project<S: AsRef<str>>(&self, fields: &[S]) -> Record {
        let mut out = Record::new();
        for field in fields {
            let field = field.as_ref();
            if let Some(v) = self.get_path(field) {
                out.fields.insert(field.to_string(), v.clone());
            }
        }
        out
    }

    /// Copies every field of `other` into this record, overwriting on conflict.
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    /// Iterates fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}
