use crate::entity::Entity;
use crate::error::DataError;
use crate::value::Value;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// An ordered sequence of items keyed by their index field.
///
/// Inserting an existing key replaces the item in place, keeping its
/// original position.
#[derive(Debug, Clone)]
pub struct KeyedItems<E> {
    entries: Vec<(Value, E)>,
    index: BTreeMap<Value, usize>,
}

impl<E> KeyedItems<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: Value, item: E) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = item,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, item));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&E> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &E)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn first(&self) -> Option<(&Value, &E)> {
        self.entries.first().map(|(k, v)| (k, v))
    }

    pub fn last(&self) -> Option<(&Value, &E)> {
        self.entries.last().map(|(k, v)| (k, v))
    }

    /// Key of the first item equal to `item`.
    pub fn index_of(&self, item: &E) -> Option<&Value>
    where
        E: PartialEq,
    {
        self.entries.iter().find(|(_, v)| v == item).map(|(k, _)| k)
    }

    pub fn into_entries(self) -> Vec<(Value, E)> {
        self.entries
    }

    pub fn into_values(self) -> Vec<E> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    pub fn map<U>(&self, mut f: impl FnMut(&E) -> U) -> KeyedItems<U> {
        self.iter().map(|(k, v)| (k.clone(), f(v))).collect()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        for (key, _) in self.entries.drain(len.min(self.entries.len())..) {
            self.index.remove(&key);
        }
    }

    pub(crate) fn reverse(&mut self) {
        self.entries.reverse();
        let last = self.entries.len().saturating_sub(1);
        for pos in self.index.values_mut() {
            *pos = last - *pos;
        }
    }
}

impl<E> KeyedItems<E> {
    /// Look up a caller-supplied key after mapping it to an index value.
    pub fn get_transformed(
        &self,
        key: Value,
        transformer: &dyn KeyTransformer,
    ) -> Result<Option<&E>, DataError> {
        let key = transformer.transform(key)?;
        Ok(self.get(&key))
    }
}

/// Maps keys given by callers to the values stored in the index field, for
/// example a string path segment to an integer id.
pub trait KeyTransformer: Send + Sync + 'static {
    fn transform(&self, key: Value) -> Result<Value, DataError>;
}

impl<F> KeyTransformer for F
where
    F: Fn(Value) -> Result<Value, DataError> + Send + Sync + 'static,
{
    fn transform(&self, key: Value) -> Result<Value, DataError> {
        self(key)
    }
}

impl<E: Clone> KeyedItems<E> {
    /// Items from `offset`, at most `length` of them, keys preserved.
    pub fn slice(&self, offset: usize, length: Option<usize>) -> KeyedItems<E> {
        let length = length.unwrap_or(usize::MAX);
        self.entries
            .iter()
            .skip(offset)
            .take(length)
            .cloned()
            .collect()
    }

    pub fn filter(&self, mut predicate: impl FnMut(&Value, &E) -> bool) -> KeyedItems<E> {
        self.entries
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .cloned()
            .collect()
    }

    /// Split into `(matching, not_matching)`.
    pub fn partition(&self, mut predicate: impl FnMut(&Value, &E) -> bool) -> (KeyedItems<E>, KeyedItems<E>) {
        let mut matching = KeyedItems::new();
        let mut rest = KeyedItems::new();
        for (k, v) in &self.entries {
            if predicate(k, v) {
                matching.insert(k.clone(), v.clone());
            } else {
                rest.insert(k.clone(), v.clone());
            }
        }
        (matching, rest)
    }
}

impl<E: Entity> KeyedItems<E> {
    /// Key rows by the value of `index_by`.
    pub fn from_rows(rows: Vec<E>, index_by: &str) -> Self {
        rows.into_iter()
            .map(|row| (row.value(index_by).unwrap_or(Value::Null), row))
            .collect()
    }
}

impl<E> Default for KeyedItems<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FromIterator<(Value, E)> for KeyedItems<E> {
    fn from_iter<I: IntoIterator<Item = (Value, E)>>(iter: I) -> Self {
        let mut items = KeyedItems::new();
        for (k, v) in iter {
            items.insert(k, v);
        }
        items
    }
}

impl<E> IntoIterator for KeyedItems<E> {
    type Item = (Value, E);
    type IntoIter = std::vec::IntoIter<(Value, E)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<E: PartialEq> PartialEq for KeyedItems<E> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

// Serialized as a plain sequence of items; keys are derivable from them.
impl<E: Serialize> Serialize for KeyedItems<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (_, item) in &self.entries {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> KeyedItems<&'static str> {
        [(Value::Int(3), "c"), (Value::Int(1), "a"), (Value::Int(2), "b")]
            .into_iter()
            .collect()
    }

    fn parse_int(key: Value) -> Result<Value, DataError> {
        match key {
            Value::Text(text) => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| DataError::InvalidArgument(format!("bad key {text:?}: {e}"))),
            other => Ok(other),
        }
    }

    #[test]
    fn test_get_transformed() {
        let it = items();
        assert_eq!(it.get_transformed(Value::from("2"), &parse_int).unwrap(), Some(&"b"));
        assert_eq!(it.get_transformed(Value::Int(3), &parse_int).unwrap(), Some(&"c"));
        assert_eq!(it.get_transformed(Value::from("9"), &parse_int).unwrap(), None);
        assert!(it.get_transformed(Value::from("x"), &parse_int).is_err());
    }

    #[test]
    fn test_insert_existing_key_keeps_position() {
        let mut it = items();
        it.insert(Value::Int(1), "A");
        assert_eq!(it.values().copied().collect::<Vec<_>>(), vec!["c", "A", "b"]);
        assert_eq!(it.get(&Value::Int(1)), Some(&"A"));
    }

    #[test]
    fn test_truncate_and_reverse_keep_index_consistent() {
        let mut it = items();
        it.truncate(2);
        assert!(!it.contains_key(&Value::Int(2)));
        it.reverse();
        assert_eq!(it.keys().cloned().collect::<Vec<_>>(), vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(it.get(&Value::Int(3)), Some(&"c"));
        assert_eq!(it.get(&Value::Int(1)), Some(&"a"));
    }

    #[test]
    fn test_slice_filter_partition() {
        let it = items();
        assert_eq!(it.slice(1, Some(1)).values().copied().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(it.slice(1, None).len(), 2);
        let odd = it.filter(|k, _| k.as_i64().is_some_and(|n| n % 2 == 1));
        assert_eq!(odd.len(), 2);
        let (big, small) = it.partition(|k, _| k > &Value::Int(1));
        assert_eq!(big.len(), 2);
        assert_eq!(small.first(), Some((&Value::Int(1), &"a")));
    }

    #[test]
    fn test_index_of_and_map() {
        let it = items();
        assert_eq!(it.index_of(&"b"), Some(&Value::Int(2)));
        assert_eq!(it.index_of(&"z"), None);
        let lens = it.map(|s| s.len());
        assert_eq!(lens.get(&Value::Int(3)), Some(&1));
    }
}
