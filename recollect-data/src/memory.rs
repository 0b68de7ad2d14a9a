//! In-memory store, useful for tests and for embedding small datasets.
//!
//! Evaluates descriptors the way a SQL engine would: conditions with `NULL`
//! operands never match, `LIKE` is ASCII case-insensitive, and `NULL` sorts
//! first in ascending order.

use crate::descriptor::QueryDescriptor;
use crate::entity::Entity;
use crate::error::DataError;
use crate::order::Direction;
use crate::query::{Condition, SeekTerm};
use crate::store::{BoxFuture, DatabaseSession, EntityStore, RowCounter};
use crate::value::Value;
use dashmap::{DashMap, DashSet};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum StagedWrite<E> {
    Persist(E),
    Remove(Value),
}

/// Round trips issued against an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub fetches: usize,
    pub counts: usize,
    pub finds: usize,
}

/// A store backed by `DashMap`, keyed by the entity's key value.
///
/// Writes are staged until [`DatabaseSession::flush`]; rows inserted through
/// [`InMemoryStore::insert`] are committed immediately.
pub struct InMemoryStore<E: Entity> {
    rows: Arc<DashMap<Value, E>>,
    managed: Arc<DashSet<Value>>,
    staged: Mutex<Vec<StagedWrite<E>>>,
    fetches: AtomicUsize,
    counts: AtomicUsize,
    finds: AtomicUsize,
}

impl<E: Entity> InMemoryStore<E> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            managed: Arc::new(DashSet::new()),
            staged: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
            finds: AtomicUsize::new(0),
        }
    }

    /// Create a store pre-populated with committed rows.
    pub fn with_rows(rows: impl IntoIterator<Item = E>) -> Self {
        let store = Self::new();
        for row in rows {
            store.insert(row);
        }
        store
    }

    /// Insert or replace a committed row, bypassing staging.
    pub fn insert(&self, entity: E) {
        self.rows.insert(entity.key().into(), entity);
    }

    /// Delete a committed row, bypassing staging.
    pub fn delete(&self, key: &E::Key) -> Option<E> {
        let key: Value = key.clone().into();
        self.managed.remove(&key);
        self.rows.remove(&key).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            fetches: self.fetches.load(AtomicOrdering::SeqCst),
            counts: self.counts.load(AtomicOrdering::SeqCst),
            finds: self.finds.load(AtomicOrdering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        self.fetches.store(0, AtomicOrdering::SeqCst);
        self.counts.store(0, AtomicOrdering::SeqCst);
        self.finds.store(0, AtomicOrdering::SeqCst);
    }

    fn matching(&self, query: &QueryDescriptor) -> Vec<E> {
        self.rows
            .iter()
            .filter(|row| {
                query
                    .conditions()
                    .iter()
                    .all(|cond| matches_condition(row.value(), cond))
            })
            .map(|row| row.value().clone())
            .collect()
    }

    fn stage(&self, write: StagedWrite<E>) -> Result<(), DataError> {
        self.staged
            .lock()
            .map_err(|_| DataError::Other("staged write queue poisoned".into()))?
            .push(write);
        Ok(())
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> RowCounter for InMemoryStore<E> {
    fn count<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, Result<u64, DataError>> {
        Box::pin(async move {
            self.counts.fetch_add(1, AtomicOrdering::SeqCst);
            let count = self.matching(query).len() as u64;
            tracing::debug!(entity = query.entity(), count, "in-memory count");
            Ok(count)
        })
    }
}

impl<E: Entity> EntityStore<E> for InMemoryStore<E> {
    fn fetch<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, Result<Vec<E>, DataError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
            let mut rows = self.matching(query);
            let ordering = query.builder().ordering();
            rows.sort_by(|a, b| compare_rows(a, b, ordering));

            let offset = query.builder().offset_value().unwrap_or(0) as usize;
            let limit = query.builder().limit_value().map_or(usize::MAX, |l| l as usize);
            let rows: Vec<E> = rows.into_iter().skip(offset).take(limit).collect();
            for row in &rows {
                self.managed.insert(row.key().into());
            }
            tracing::debug!(entity = query.entity(), rows = rows.len(), "in-memory fetch");
            Ok(rows)
        })
    }

    fn find<'a>(&'a self, key: &'a E::Key) -> BoxFuture<'a, Result<Option<E>, DataError>> {
        Box::pin(async move {
            self.finds.fetch_add(1, AtomicOrdering::SeqCst);
            let key: Value = key.clone().into();
            let found = self.rows.get(&key).map(|row| row.value().clone());
            if found.is_some() {
                self.managed.insert(key);
            }
            Ok(found)
        })
    }

    fn persist(&self, entity: E) -> BoxFuture<'_, Result<(), DataError>> {
        Box::pin(async move {
            self.managed.insert(entity.key().into());
            self.stage(StagedWrite::Persist(entity))
        })
    }

    fn remove<'a>(&'a self, entity: &'a E) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(async move {
            let key: Value = entity.key().into();
            self.managed.remove(&key);
            self.stage(StagedWrite::Remove(key))
        })
    }

    fn contains(&self, entity: &E) -> bool {
        let key: Value = entity.key().into();
        self.managed.contains(&key)
    }
}

impl<E: Entity> DatabaseSession for InMemoryStore<E> {
    fn flush(&self) -> BoxFuture<'_, Result<(), DataError>> {
        Box::pin(async move {
            let writes = std::mem::take(
                &mut *self
                    .staged
                    .lock()
                    .map_err(|_| DataError::Other("staged write queue poisoned".into()))?,
            );
            let applied = writes.len();
            for write in writes {
                match write {
                    StagedWrite::Persist(entity) => {
                        self.rows.insert(entity.key().into(), entity);
                    }
                    StagedWrite::Remove(key) => {
                        self.rows.remove(&key);
                    }
                }
            }
            tracing::info!(entity = E::entity_name(), applied, "flushed staged writes");
            Ok(())
        })
    }

    fn clear(&self) {
        if let Ok(mut staged) = self.staged.lock() {
            staged.clear();
        }
        self.managed.clear();
    }
}

fn column_value<E: Entity>(row: &E, column: &str) -> Value {
    row.value(column).unwrap_or(Value::Null)
}

fn compare_rows<E: Entity>(a: &E, b: &E, ordering: &[(String, Direction)]) -> Ordering {
    for (column, direction) in ordering {
        let ord = column_value(a, column).cmp(&column_value(b, column));
        let ord = if direction.is_ascending() { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// SQL comparison: `None` when either side is `NULL`.
fn sql_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        None
    } else {
        Some(left.cmp(right))
    }
}

fn matches_condition<E: Entity>(row: &E, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(col, val) => sql_cmp(&column_value(row, col), val) == Some(Ordering::Equal),
        Condition::NotEq(col, val) => {
            matches!(sql_cmp(&column_value(row, col), val), Some(o) if o != Ordering::Equal)
        }
        Condition::Like(col, pattern) => match column_value(row, col) {
            Value::Text(text) => like(&text, pattern),
            _ => false,
        },
        Condition::Gt(col, val) => sql_cmp(&column_value(row, col), val) == Some(Ordering::Greater),
        Condition::Ge(col, val) => matches!(
            sql_cmp(&column_value(row, col), val),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Condition::Lt(col, val) => sql_cmp(&column_value(row, col), val) == Some(Ordering::Less),
        Condition::Le(col, val) => matches!(
            sql_cmp(&column_value(row, col), val),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Condition::In(col, vals) => {
            let v = column_value(row, col);
            !v.is_null() && vals.contains(&v)
        }
        Condition::IsNull(col) => column_value(row, col).is_null(),
        Condition::IsNotNull(col) => !column_value(row, col).is_null(),
        Condition::Seek(terms) => matches_seek(row, terms),
    }
}

/// Keyset seeks follow the sort order, where `NULL` is the smallest value.
fn matches_seek<E: Entity>(row: &E, terms: &[SeekTerm]) -> bool {
    (0..terms.len()).any(|i| {
        let prefix_equal = terms[..i]
            .iter()
            .all(|t| column_value(row, &t.column) == t.value);
        let term = &terms[i];
        let wanted = if term.direction.is_ascending() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
        prefix_equal && column_value(row, &term.column).cmp(&term.value) == wanted
    })
}

/// SQL `LIKE` with `%` and `_` wildcards, ASCII case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    // matches[j]: pattern[..i] matches text[..j]
    let mut matches = vec![false; text.len() + 1];
    matches[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut any = false;
                for j in 0..=text.len() {
                    any |= matches[j];
                    next[j] = any;
                }
            }
            _ => {
                for j in 1..=text.len() {
                    next[j] = matches[j - 1] && (*p == '_' || *p == text[j - 1]);
                }
            }
        }
        matches = next;
    }
    matches[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like() {
        assert!(like("Alice", "al%"));
        assert!(like("alice", "%LIC%"));
        assert!(like("bob", "b_b"));
        assert!(!like("bob", "b_"));
        assert!(like("", "%"));
        assert!(!like("carol", "%x%"));
    }

    #[test]
    fn test_sql_cmp_null() {
        assert_eq!(sql_cmp(&Value::Null, &Value::Int(1)), None);
        assert_eq!(sql_cmp(&Value::Int(2), &Value::Int(1)), Some(Ordering::Greater));
    }
}
