use serde::{Deserialize, Serialize};
use std::slice;

/// A single `(key, value)` record. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_parts(self) -> (String, String) {
        (self.key, self.value)
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for KeyValue {
    fn from((key, value): (K, V)) -> Self {
        KeyValue::new(key, value)
    }
}

/// Ordered, append-only sequence of records.
///
/// Used both as job input/output and as the sink handed to mappers and
/// reducers. Not synchronized; share it across threads behind a lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvList {
    pairs: Vec<KeyValue>,
}

impl KvList {
    pub fn new() -> Self {
        KvList { pairs: vec![] }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        KvList {
            pairs: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, pair: KeyValue) {
        self.pairs.push(pair);
    }

    /// Shorthand for `append(KeyValue::new(key, value))`.
    pub fn emit(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push(KeyValue::new(key, value));
    }

    /// Moves every record of `other` onto the end of this list, keeping order.
    pub fn extend(&mut self, other: KvList) {
        self.pairs.extend(other.pairs);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&KeyValue> {
        self.pairs.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, KeyValue> {
        self.pairs.iter()
    }

    pub fn as_slice(&self) -> &[KeyValue] {
        &self.pairs
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(KeyValue::value)
    }

    /// Stable sort by key. Keys compare byte-wise, so the order is total and
    /// does not depend on locale.
    pub fn sort_by_key(&mut self) {
        self.pairs.sort_by(|a, b| a.key.cmp(&b.key));
    }

    pub(crate) fn try_reserve(
        &mut self,
        additional: usize,
    ) -> Result<(), std::collections::TryReserveError> {
        self.pairs.try_reserve(additional)
    }
}

impl IntoIterator for KvList {
    type Item = KeyValue;
    type IntoIter = std::vec::IntoIter<KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl<'a> IntoIterator for &'a KvList {
    type Item = &'a KeyValue;
    type IntoIter = slice::Iter<'a, KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl FromIterator<KeyValue> for KvList {
    fn from_iter<T: IntoIterator<Item = KeyValue>>(iter: T) -> Self {
        KvList {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<KeyValue>> for KvList {
    fn from(pairs: Vec<KeyValue>) -> Self {
        KvList { pairs }
    }
}
