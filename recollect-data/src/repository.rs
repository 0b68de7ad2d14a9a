//! The repository facade: a keyed-collection view of every row of one
//! entity type.

use crate::config::RepositoryConfig;
use crate::count::CountStrategy;
use crate::descriptor::{Criteria, QueryDescriptor};
use crate::entity::Entity;
use crate::error::DataError;
use crate::pageable::QueryPageable;
use crate::query::QueryBuilder;
use crate::recollection::QueryRecollection;
use crate::reference::Reference;
use crate::store::EntityStore;
use crate::value::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A repository over entity `E` backed by store `S`.
///
/// Identity operations (`get`, `add`, `remove`, ...) go straight to the
/// store. Paging, counting and the collection helpers come from the
/// underlying [`QueryRecollection`], reachable through [`Deref`].
///
/// `add` and `remove` only stage writes; see
/// [`DatabaseSession`](crate::store::DatabaseSession).
///
/// ```ignore
/// let users = Repository::<User, _>::with_config(
///     store,
///     RepositoryConfig::new()
///         .with_order_by("name")
///         .with_count(CountStrategyKind::Delegate),
/// )?;
/// let page = users.first_page().await?;
/// let admins = users.matching(&Criteria::new().eq("role", "admin"))?;
/// ```
pub struct Repository<E, S> {
    recollection: QueryRecollection<E, S>,
    config: RepositoryConfig,
}

impl<E, S> Repository<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    pub fn new(store: Arc<S>) -> Result<Self, DataError> {
        Self::with_config(store, RepositoryConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: RepositoryConfig) -> Result<Self, DataError> {
        config.validate()?;
        let strategy = config.count_strategy();
        if !strategy.allowed_in_repository() {
            return Err(DataError::configuration(format!(
                "count strategy {strategy:?} cannot be used by a repository"
            )));
        }
        let query = QueryDescriptor::for_entity::<E>(config.alias(), config.index_by())?
            .with_order(config.order_by()?);
        let recollection = QueryRecollection::configured(store, query, &config)?;
        tracing::debug!(
            entity = E::entity_name(),
            items_per_page = recollection.items_per_page(),
            "repository created"
        );
        Ok(Self {
            recollection,
            config,
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn recollection(&self) -> &QueryRecollection<E, S> {
        &self.recollection
    }

    pub fn into_recollection(self) -> QueryRecollection<E, S> {
        self.recollection
    }

    fn store(&self) -> &Arc<S> {
        self.recollection.store()
    }

    /// The entity with `key`, or `None`. A null key matches nothing.
    pub async fn get(&self, key: &E::Key) -> Result<Option<E>, DataError> {
        let value: Value = key.clone().into();
        if value.is_null() {
            return Ok(None);
        }
        self.store().find(key).await
    }

    pub async fn get_or_fail(&self, key: &E::Key) -> Result<E, DataError> {
        self.get(key).await?.ok_or_else(|| {
            let value: Value = key.clone().into();
            DataError::NotFound(format!("{} with key {value}", E::entity_name()))
        })
    }

    pub async fn contains_key(&self, key: &E::Key) -> Result<bool, DataError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Whether the store currently manages this entity.
    pub fn contains(&self, entity: &E) -> bool {
        self.store().contains(entity)
    }

    /// Stage `entity` for insertion or update.
    pub async fn add(&self, entity: E) -> Result<(), DataError> {
        tracing::debug!(entity = E::entity_name(), key = ?entity.key(), "staging add");
        self.store().persist(entity).await
    }

    /// Stage removal of the entity with `key`. Returns the removed entity,
    /// or `None` when no row has that key.
    pub async fn remove(&self, key: &E::Key) -> Result<Option<E>, DataError> {
        let Some(entity) = self.get(key).await? else {
            return Ok(None);
        };
        self.remove_element(&entity).await?;
        Ok(Some(entity))
    }

    /// Stage removal of `entity`. Returns `false` without staging anything
    /// when the store does not manage it.
    pub async fn remove_element(&self, entity: &E) -> Result<bool, DataError> {
        if !self.store().contains(entity) {
            tracing::debug!(
                entity = E::entity_name(),
                key = ?entity.key(),
                "remove of unmanaged entity ignored"
            );
            return Ok(false);
        }
        tracing::debug!(entity = E::entity_name(), key = ?entity.key(), "staging remove");
        self.store().remove(entity).await?;
        Ok(true)
    }

    /// A lazy handle to the entity with `key`; nothing is queried until it
    /// is loaded.
    pub fn reference(&self, key: E::Key) -> Result<Reference<E, S>, DataError> {
        let value: Value = key.clone().into();
        if value.is_null() {
            return Err(DataError::InvalidArgument(format!(
                "cannot reference {} by a null key",
                E::entity_name()
            )));
        }
        Ok(Reference::new(self.store().clone(), key))
    }

    /// A recollection of the rows matching `criteria`, with this repository's
    /// settings. An ordering in `criteria` replaces the repository's.
    pub fn matching(&self, criteria: &Criteria) -> Result<QueryRecollection<E, S>, DataError> {
        self.recollection.with_query(self.filtered(criteria)?)
    }

    /// Like [`Repository::matching`] with another count strategy. Unlike the
    /// repository itself, the result may use a caller-provided count.
    pub fn matching_with_count(
        &self,
        criteria: &Criteria,
        strategy: Arc<dyn CountStrategy>,
    ) -> Result<QueryRecollection<E, S>, DataError> {
        let pageable = self.matching_pageable(criteria)?.with_shared_count_strategy(strategy);
        Ok(self.recollection.with_pageable(pageable))
    }

    pub fn matching_pageable(&self, criteria: &Criteria) -> Result<QueryPageable<E, S>, DataError> {
        self.recollection.pageable().with_query(self.filtered(criteria)?)
    }

    fn filtered(&self, criteria: &Criteria) -> Result<QueryDescriptor, DataError> {
        self.recollection.query().with_filter(criteria)
    }

    /// Same repository with another page size; a resolved count is kept.
    pub fn with_items_per_page(&self, items_per_page: u64) -> Result<Self, DataError> {
        Ok(Self {
            recollection: self.recollection.with_items_per_page(items_per_page)?,
            config: self.config.clone().with_items_per_page(items_per_page),
        })
    }

    pub fn update_query(&self, update: impl FnOnce(&mut QueryBuilder)) -> Result<Self, DataError> {
        Ok(Self {
            recollection: self.recollection.update_query(update)?,
            config: self.config.clone(),
        })
    }

    pub async fn refresh_count(&mut self) -> Result<u64, DataError> {
        self.recollection.refresh_count().await
    }
}

impl<E, S> Deref for Repository<E, S> {
    type Target = QueryRecollection<E, S>;

    fn deref(&self) -> &Self::Target {
        &self.recollection
    }
}

impl<E, S> Clone for Repository<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    fn clone(&self) -> Self {
        Self {
            recollection: self.recollection.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E, S> fmt::Debug for Repository<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("recollection", &self.recollection)
            .field("config", &self.config)
            .finish()
    }
}
