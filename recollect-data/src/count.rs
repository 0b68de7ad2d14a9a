//! Count strategies: policies deciding whether and how a total row count is
//! obtained for a query.
//!
//! A strategy is a trait object so applications can plug their own (for
//! example an estimate read from table statistics). Three strategies ship with
//! the crate:
//!
//! | Strategy     | Count                                   | Repositories |
//! |--------------|-----------------------------------------|--------------|
//! | [`Restrict`] | never available                         | allowed      |
//! | [`Delegate`] | live `COUNT` query, memoized per view   | allowed      |
//! | [`Provided`] | caller-supplied value, never queries    | rejected     |

use crate::descriptor::QueryDescriptor;
use crate::error::DataError;
use crate::store::{BoxFuture, RowCounter};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountResult {
    Exact(u64),
    /// The strategy forbids counting.
    Unavailable,
    /// The strategy had nothing to report, e.g. `Provided` without a value.
    NotAttempted,
}

impl CountResult {
    pub fn exact(self) -> Option<u64> {
        match self {
            CountResult::Exact(n) => Some(n),
            CountResult::Unavailable | CountResult::NotAttempted => None,
        }
    }
}

pub trait CountStrategy: fmt::Debug + Send + Sync + 'static {
    fn resolve<'a>(
        &'a self,
        counter: &'a dyn RowCounter,
        query: &'a QueryDescriptor,
    ) -> BoxFuture<'a, Result<CountResult, DataError>>;

    /// Recompute the count after the cached value was dropped. Defaults to a
    /// live count query.
    fn refresh<'a>(
        &'a self,
        counter: &'a dyn RowCounter,
        query: &'a QueryDescriptor,
    ) -> BoxFuture<'a, Result<CountResult, DataError>> {
        Box::pin(async move { counter.count(query).await.map(CountResult::Exact) })
    }

    /// Whether repositories may use this strategy. Strategies carrying a
    /// caller-supplied number should return `false`: a repository outlives any
    /// externally supplied count.
    fn allowed_in_repository(&self) -> bool {
        true
    }
}

/// Counting is not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct Restrict;

impl CountStrategy for Restrict {
    fn resolve<'a>(
        &'a self,
        _counter: &'a dyn RowCounter,
        _query: &'a QueryDescriptor,
    ) -> BoxFuture<'a, Result<CountResult, DataError>> {
        Box::pin(async { Ok(CountResult::Unavailable) })
    }

    fn refresh<'a>(
        &'a self,
        _counter: &'a dyn RowCounter,
        _query: &'a QueryDescriptor,
    ) -> BoxFuture<'a, Result<CountResult, DataError>> {
        Box::pin(async { Ok(CountResult::Unavailable) })
    }
}

/// Count with a live query against the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delegate;

impl CountStrategy for Delegate {
    fn resolve<'a>(
        &'a self,
        counter: &'a dyn RowCounter,
        query: &'a QueryDescriptor,
    ) -> BoxFuture<'a, Result<CountResult, DataError>> {
        Box::pin(async move {
            tracing::debug!(entity = query.entity(), "issuing count query");
            counter.count(query).await.map(CountResult::Exact)
        })
    }
}

/// A count supplied by the caller, typically computed once elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct Provided {
    count: Option<u64>,
}

impl Provided {
    pub fn new(count: u64) -> Self {
        Self { count: Some(count) }
    }

    /// A provided strategy with no value yet; resolves to `NotAttempted`.
    pub fn unset() -> Self {
        Self { count: None }
    }

    pub fn value(&self) -> Option<u64> {
        self.count
    }
}

impl CountStrategy for Provided {
    fn resolve<'a>(
        &'a self,
        _counter: &'a dyn RowCounter,
        _query: &'a QueryDescriptor,
    ) -> BoxFuture<'a, Result<CountResult, DataError>> {
        let result = match self.count {
            Some(n) => CountResult::Exact(n),
            None => CountResult::NotAttempted,
        };
        Box::pin(async move { Ok(result) })
    }

    fn allowed_in_repository(&self) -> bool {
        false
    }
}

/// Strategy names accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountStrategyKind {
    #[default]
    Restrict,
    Delegate,
    Provided,
}

impl CountStrategyKind {
    pub fn into_strategy(self) -> Arc<dyn CountStrategy> {
        match self {
            CountStrategyKind::Restrict => Arc::new(Restrict),
            CountStrategyKind::Delegate => Arc::new(Delegate),
            CountStrategyKind::Provided => Arc::new(Provided::unset()),
        }
    }
}

/// The memoized count of one pageable instance.
///
/// Only exact counts are stored. Concurrent resolutions on the same cell
/// share a single count query.
#[derive(Debug, Default)]
pub(crate) struct CountCell(OnceCell<u64>);

impl CountCell {
    pub(crate) fn seeded(value: Option<u64>) -> Self {
        match value {
            Some(n) => CountCell(OnceCell::from(n)),
            None => CountCell(OnceCell::new()),
        }
    }

    pub(crate) fn get(&self) -> Option<u64> {
        self.0.get().copied()
    }

    pub(crate) async fn resolve(
        &self,
        strategy: &dyn CountStrategy,
        counter: &dyn RowCounter,
        query: &QueryDescriptor,
    ) -> Result<CountResult, DataError> {
        // The init error carries either a non-exact result or a real failure.
        let outcome = self
            .0
            .get_or_try_init(|| async {
                match strategy.resolve(counter, query).await {
                    Ok(CountResult::Exact(n)) => Ok(n),
                    Ok(other) => Err(Ok(other)),
                    Err(err) => Err(Err(err)),
                }
            })
            .await;
        match outcome {
            Ok(n) => Ok(CountResult::Exact(*n)),
            Err(Ok(other)) => Ok(other),
            Err(Err(err)) => Err(err),
        }
    }

    pub(crate) async fn refresh(
        &mut self,
        strategy: &dyn CountStrategy,
        counter: &dyn RowCounter,
        query: &QueryDescriptor,
    ) -> Result<CountResult, DataError> {
        self.0 = OnceCell::new();
        let result = strategy.refresh(counter, query).await?;
        if let CountResult::Exact(n) = result {
            let _ = self.0.set(n);
        }
        Ok(result)
    }
}
