//! Eager materialization bounded by soft and hard limits.

use crate::descriptor::QueryDescriptor;
use crate::entity::Entity;
use crate::error::DataError;
use crate::items::KeyedItems;
use crate::store::EntityStore;

/// Size bounds for eager materialization.
///
/// - `hard`: exceeding it fails with [`DataError::ResultTooLarge`].
/// - `soft`: exceeding it flags the result. Without a hard limit the result is
///   also truncated to the soft limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    soft: Option<u64>,
    hard: Option<u64>,
}

impl Limits {
    pub fn new(soft: Option<u64>, hard: Option<u64>) -> Result<Self, DataError> {
        if soft == Some(0) || hard == Some(0) {
            return Err(DataError::configuration("result limits must be positive"));
        }
        if let (Some(soft), Some(hard)) = (soft, hard) {
            if hard < soft {
                return Err(DataError::configuration(format!(
                    "hard limit ({hard}) is lower than soft limit ({soft})"
                )));
            }
        }
        Ok(Self { soft, hard })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn soft(&self) -> Option<u64> {
        self.soft
    }

    pub fn hard(&self) -> Option<u64> {
        self.hard
    }

    /// Rows to request: one past the tightest limit that decides the outcome.
    fn fetch_limit(&self) -> Option<u64> {
        self.hard.or(self.soft).map(|limit| limit.saturating_add(1))
    }
}

/// A materialized result and whether the soft limit was crossed.
#[derive(Debug, Clone)]
pub struct Materialized<E> {
    pub items: KeyedItems<E>,
    pub over_soft_limit: bool,
}

/// Load every row matched by `query` into an ordered keyed sequence.
pub async fn materialize<E, S>(
    store: &S,
    query: &QueryDescriptor,
    limits: Limits,
) -> Result<Materialized<E>, DataError>
where
    E: Entity,
    S: EntityStore<E> + ?Sized,
{
    let windowed = query.windowed(None, limits.fetch_limit());
    let rows = store.fetch(&windowed).await?;
    let fetched = rows.len() as u64;

    if let Some(hard) = limits.hard {
        if fetched > hard {
            return Err(DataError::ResultTooLarge { limit: hard, fetched });
        }
    }

    let mut items = KeyedItems::from_rows(rows, query.index_by());
    let over_soft_limit = limits.soft.is_some_and(|soft| fetched > soft);
    if over_soft_limit {
        if let (Some(soft), None) = (limits.soft, limits.hard) {
            items.truncate(soft as usize);
            tracing::warn!(
                entity = query.entity(),
                limit = soft,
                "result truncated at soft limit"
            );
        } else {
            tracing::warn!(
                entity = query.entity(),
                limit = ?limits.soft,
                rows = fetched,
                "result exceeds soft limit"
            );
        }
    }

    Ok(Materialized {
        items,
        over_soft_limit,
    })
}
