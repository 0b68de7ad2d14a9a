use crate::config::RepositoryConfig;
use crate::descriptor::QueryDescriptor;
use crate::entity::Entity;
use crate::error::DataError;
use crate::items::{KeyTransformer, KeyedItems};
use crate::pageable::QueryPageable;
use crate::query::QueryBuilder;
use crate::safeguard::{self, Limits, Materialized};
use crate::store::EntityStore;
use crate::value::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A read-only collection over a query: pageable, countable, and loadable in
/// full within its limits.
///
/// The collection helpers work on the materialized items, which are loaded on
/// first use and kept for the lifetime of the instance. Paging and counting
/// are available through [`Deref`] to [`QueryPageable`].
pub struct QueryRecollection<E, S> {
    pageable: QueryPageable<E, S>,
    limits: Limits,
    key_transformer: Option<Arc<dyn KeyTransformer>>,
    loaded: OnceCell<Materialized<E>>,
}

impl<E, S> QueryRecollection<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    pub fn new(store: Arc<S>, query: QueryDescriptor) -> Result<Self, DataError> {
        Ok(Self::from_pageable(QueryPageable::new(store, query)?, Limits::unbounded()))
    }

    pub fn configured(
        store: Arc<S>,
        query: QueryDescriptor,
        config: &RepositoryConfig,
    ) -> Result<Self, DataError> {
        config.validate()?;
        Ok(Self {
            key_transformer: config.key_transformer.clone(),
            ..Self::from_pageable(
                QueryPageable::configured(store, query, config)?,
                config.limits()?,
            )
        })
    }

    pub fn from_pageable(pageable: QueryPageable<E, S>, limits: Limits) -> Self {
        Self {
            pageable,
            limits,
            key_transformer: None,
            loaded: OnceCell::new(),
        }
    }

    pub(crate) fn with_pageable(&self, pageable: QueryPageable<E, S>) -> Self {
        Self {
            key_transformer: self.key_transformer.clone(),
            ..Self::from_pageable(pageable, self.limits)
        }
    }

    pub fn pageable(&self) -> &QueryPageable<E, S> {
        &self.pageable
    }

    pub fn into_pageable(self) -> QueryPageable<E, S> {
        self.pageable
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn with_limits(&self, limits: Limits) -> Self {
        Self {
            limits,
            ..self.with_pageable(self.pageable.clone())
        }
    }

    /// Same query, mapping keys given to [`QueryRecollection::get_loaded`]
    /// through `transformer` first.
    pub fn with_key_transformer(&self, transformer: impl KeyTransformer) -> Self {
        Self {
            key_transformer: Some(Arc::new(transformer)),
            ..self.with_pageable(self.pageable.clone())
        }
    }

    pub fn with_boundary_fields<F: Into<String>>(
        &self,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<Self, DataError> {
        Ok(self.with_pageable(self.pageable.with_boundary_fields(fields)?))
    }

    pub fn with_items_per_page(&self, items_per_page: u64) -> Result<Self, DataError> {
        Ok(self.with_pageable(self.pageable.with_items_per_page(items_per_page)?))
    }

    pub fn with_query(&self, query: QueryDescriptor) -> Result<Self, DataError> {
        Ok(self.with_pageable(self.pageable.with_query(query)?))
    }

    pub fn update_query(&self, update: impl FnOnce(&mut QueryBuilder)) -> Result<Self, DataError> {
        Ok(self.with_pageable(self.pageable.update_query(update)?))
    }

    pub async fn refresh_count(&mut self) -> Result<u64, DataError> {
        self.pageable.refresh_count().await
    }

    /// Load every matching row within the limits. Runs once per instance.
    pub async fn materialized(&self) -> Result<&Materialized<E>, DataError> {
        self.loaded
            .get_or_try_init(|| {
                safeguard::materialize(self.pageable.store().as_ref(), self.pageable.query(), self.limits)
            })
            .await
    }

    pub async fn items(&self) -> Result<&KeyedItems<E>, DataError> {
        Ok(&self.materialized().await?.items)
    }

    /// Whether the loaded items crossed the soft limit.
    pub async fn over_soft_limit(&self) -> Result<bool, DataError> {
        Ok(self.materialized().await?.over_soft_limit)
    }

    pub async fn is_empty(&self) -> Result<bool, DataError> {
        Ok(self.items().await?.is_empty())
    }

    pub async fn len(&self) -> Result<usize, DataError> {
        Ok(self.items().await?.len())
    }

    pub async fn keys(&self) -> Result<Vec<Value>, DataError> {
        Ok(self.items().await?.keys().cloned().collect())
    }

    pub async fn values(&self) -> Result<Vec<E>, DataError> {
        Ok(self.items().await?.values().cloned().collect())
    }

    /// Key and item pairs, in query order.
    pub async fn to_vec(&self) -> Result<Vec<(Value, E)>, DataError> {
        Ok(self
            .items()
            .await?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub async fn first(&self) -> Result<Option<E>, DataError> {
        Ok(self.items().await?.first().map(|(_, v)| v.clone()))
    }

    pub async fn last(&self) -> Result<Option<E>, DataError> {
        Ok(self.items().await?.last().map(|(_, v)| v.clone()))
    }

    /// Item under `key` among the loaded items, without a key lookup query.
    /// The key goes through the key transformer when one is set.
    pub async fn get_loaded(&self, key: impl Into<Value>) -> Result<Option<E>, DataError> {
        let key = key.into();
        let items = self.items().await?;
        match &self.key_transformer {
            Some(transformer) => Ok(items.get_transformed(key, transformer.as_ref())?.cloned()),
            None => Ok(items.get(&key).cloned()),
        }
    }

    pub async fn slice(&self, offset: usize, length: Option<usize>) -> Result<KeyedItems<E>, DataError> {
        Ok(self.items().await?.slice(offset, length))
    }

    pub async fn exists(&self, mut predicate: impl FnMut(&Value, &E) -> bool) -> Result<bool, DataError> {
        Ok(self.items().await?.iter().any(|(k, v)| predicate(k, v)))
    }

    pub async fn for_all(&self, mut predicate: impl FnMut(&Value, &E) -> bool) -> Result<bool, DataError> {
        Ok(self.items().await?.iter().all(|(k, v)| predicate(k, v)))
    }

    pub async fn filter(&self, predicate: impl FnMut(&Value, &E) -> bool) -> Result<KeyedItems<E>, DataError> {
        Ok(self.items().await?.filter(predicate))
    }

    pub async fn map<U>(&self, f: impl FnMut(&E) -> U) -> Result<KeyedItems<U>, DataError> {
        Ok(self.items().await?.map(f))
    }

    pub async fn partition(
        &self,
        predicate: impl FnMut(&Value, &E) -> bool,
    ) -> Result<(KeyedItems<E>, KeyedItems<E>), DataError> {
        Ok(self.items().await?.partition(predicate))
    }

    pub async fn index_of(&self, item: &E) -> Result<Option<Value>, DataError>
    where
        E: PartialEq,
    {
        Ok(self.items().await?.index_of(item).cloned())
    }

    pub async fn find_first(&self, mut predicate: impl FnMut(&Value, &E) -> bool) -> Result<Option<E>, DataError> {
        Ok(self
            .items()
            .await?
            .iter()
            .find(|(k, v)| predicate(k, v))
            .map(|(_, v)| v.clone()))
    }

    pub async fn reduce<A>(&self, initial: A, mut f: impl FnMut(A, &E) -> A) -> Result<A, DataError> {
        Ok(self.items().await?.values().fold(initial, |acc, v| f(acc, v)))
    }
}

impl<E, S> Deref for QueryRecollection<E, S> {
    type Target = QueryPageable<E, S>;

    fn deref(&self) -> &Self::Target {
        &self.pageable
    }
}

impl<E, S> Clone for QueryRecollection<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    /// Clones start with nothing loaded and no memoized count.
    fn clone(&self) -> Self {
        self.with_pageable(self.pageable.clone())
    }
}

impl<E, S> fmt::Debug for QueryRecollection<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRecollection")
            .field("pageable", &self.pageable)
            .field("limits", &self.limits)
            .field("key_transformer", &self.key_transformer.is_some())
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}
