//! The lazy pageable query: a descriptor plus a count strategy, a pagination
//! mode and a page size.
//!
//! Nothing touches the store at construction. The page adapter is built on
//! the first page request and the count is resolved on the first count
//! request; both are then kept for the lifetime of the instance.

use crate::adapter::PageAdapter;
use crate::config::{defaults, RepositoryConfig};
use crate::count::{CountCell, CountResult, CountStrategy};
use crate::descriptor::QueryDescriptor;
use crate::entity::{self, Entity};
use crate::error::DataError;
use crate::page::{Page, PageIdentifier};
use crate::pagination::{Pagination, SeekMethod};
use crate::query::QueryBuilder;
use crate::store::EntityStore;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// Largest accepted page size.
pub const MAX_ITEMS_PER_PAGE: u64 = u32::MAX as u64;

pub struct QueryPageable<E, S> {
    store: Arc<S>,
    query: QueryDescriptor,
    count_strategy: Arc<dyn CountStrategy>,
    pagination: Pagination,
    seek_method: SeekMethod,
    items_per_page: u64,
    boundary_fields: Option<Arc<[String]>>,
    adapter: OnceLock<PageAdapter>,
    count: CountCell,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S> QueryPageable<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    /// A pageable over `query` with the process-wide defaults.
    pub fn new(store: Arc<S>, query: QueryDescriptor) -> Result<Self, DataError> {
        let d = defaults();
        Self::build(
            store,
            query,
            d.count.into_strategy(),
            d.pagination,
            d.seek_method,
            d.items_per_page,
            None,
        )
    }

    /// A pageable over `query` using the paging and count settings of
    /// `config`. The descriptor's own ordering is kept.
    pub fn configured(
        store: Arc<S>,
        query: QueryDescriptor,
        config: &RepositoryConfig,
    ) -> Result<Self, DataError> {
        Self::build(
            store,
            query,
            config.count_strategy(),
            config.pagination(),
            config.seek_method(),
            config.items_per_page(),
            config.boundary_fields.as_deref().map(Arc::from),
        )
    }

    fn build(
        store: Arc<S>,
        query: QueryDescriptor,
        count_strategy: Arc<dyn CountStrategy>,
        pagination: Pagination,
        seek_method: SeekMethod,
        items_per_page: u64,
        boundary_fields: Option<Arc<[String]>>,
    ) -> Result<Self, DataError> {
        validate_page_size(items_per_page)?;
        validate_query::<E>(&query)?;
        validate_boundary_fields(&query, boundary_fields.as_deref())?;
        Ok(Self {
            store,
            query,
            count_strategy,
            pagination,
            seek_method,
            items_per_page,
            boundary_fields,
            adapter: OnceLock::new(),
            count: CountCell::default(),
            _entity: PhantomData,
        })
    }

    /// Same store and settings over another descriptor. The count cache is
    /// not carried over.
    pub fn with_query(&self, query: QueryDescriptor) -> Result<Self, DataError> {
        validate_query::<E>(&query)?;
        validate_boundary_fields(&query, self.boundary_fields.as_deref())?;
        Ok(Self {
            query,
            ..self.derived(CountCell::default())
        })
    }

    /// Derive a pageable by mutating a copy of the query builder.
    pub fn update_query(&self, update: impl FnOnce(&mut QueryBuilder)) -> Result<Self, DataError> {
        self.with_query(self.query.update_builder(update)?)
    }

    /// Same query with another page size. The page adapter is rebuilt; an
    /// already resolved count is kept since the result set is unchanged.
    pub fn with_items_per_page(&self, items_per_page: u64) -> Result<Self, DataError> {
        validate_page_size(items_per_page)?;
        Ok(Self {
            items_per_page,
            ..self.derived(CountCell::seeded(self.count.get()))
        })
    }

    pub fn with_count_strategy(&self, strategy: impl CountStrategy) -> Self {
        self.with_shared_count_strategy(Arc::new(strategy))
    }

    pub fn with_shared_count_strategy(&self, strategy: Arc<dyn CountStrategy>) -> Self {
        Self {
            count_strategy: strategy,
            ..self.derived(CountCell::default())
        }
    }

    pub fn with_pagination(&self, pagination: Pagination) -> Self {
        Self {
            pagination,
            ..self.derived(CountCell::seeded(self.count.get()))
        }
    }

    pub fn with_seek_method(&self, seek_method: SeekMethod) -> Self {
        Self {
            seek_method,
            ..self.derived(CountCell::seeded(self.count.get()))
        }
    }

    /// Record only `fields` in keyset boundaries. They must be a leading part
    /// of the ordering (with the index field appended) that includes the
    /// index field.
    pub fn with_boundary_fields<F: Into<String>>(
        &self,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<Self, DataError> {
        let fields: Arc<[String]> = fields.into_iter().map(Into::into).collect();
        validate_boundary_fields(&self.query, Some(&fields[..]))?;
        Ok(Self {
            boundary_fields: Some(fields),
            ..self.derived(CountCell::seeded(self.count.get()))
        })
    }

    /// Record the whole ordering in keyset boundaries.
    pub fn with_full_boundaries(&self) -> Self {
        Self {
            boundary_fields: None,
            ..self.derived(CountCell::seeded(self.count.get()))
        }
    }

    fn derived(&self, count: CountCell) -> Self {
        Self {
            store: self.store.clone(),
            query: self.query.clone(),
            count_strategy: self.count_strategy.clone(),
            pagination: self.pagination,
            seek_method: self.seek_method,
            items_per_page: self.items_per_page,
            boundary_fields: self.boundary_fields.clone(),
            adapter: OnceLock::new(),
            count,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn query(&self) -> &QueryDescriptor {
        &self.query
    }

    /// A copy of the query builder. Changing it has no effect on this
    /// instance; see [`QueryPageable::update_query`].
    pub fn query_builder(&self) -> QueryBuilder {
        self.query.builder().clone()
    }

    pub fn count_strategy(&self) -> &Arc<dyn CountStrategy> {
        &self.count_strategy
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn seek_method(&self) -> SeekMethod {
        self.seek_method
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn boundary_fields(&self) -> Option<&[String]> {
        self.boundary_fields.as_deref()
    }

    /// The memoized count, if one was resolved already. Never queries.
    pub fn cached_count(&self) -> Option<u64> {
        self.count.get()
    }

    /// Resolve the count through the strategy, memoizing exact results.
    pub async fn count_result(&self) -> Result<CountResult, DataError> {
        self.count
            .resolve(self.count_strategy.as_ref(), self.store.as_ref(), &self.query)
            .await
    }

    /// Total number of matching rows. Fails with
    /// [`DataError::CountUnsupported`] when the strategy yields no count.
    pub async fn count(&self) -> Result<u64, DataError> {
        self.count_result()
            .await?
            .exact()
            .ok_or_else(|| DataError::count_unsupported(self.query.entity()))
    }

    /// Drop the memoized count and resolve it again with a live count where
    /// the strategy allows one.
    pub async fn refresh_count(&mut self) -> Result<u64, DataError> {
        let result = self
            .count
            .refresh(self.count_strategy.as_ref(), self.store.as_ref(), &self.query)
            .await?;
        result
            .exact()
            .ok_or_else(|| DataError::count_unsupported(self.query.entity()))
    }

    /// Total number of pages.
    ///
    /// Offset pagination cannot work without it and fails with
    /// [`DataError::CountUnsupported`]. Keyset pagination returns `None`
    /// instead.
    pub async fn page_count(&self) -> Result<Option<u64>, DataError> {
        let total = self.count_result().await?.exact();
        match (total, self.pagination) {
            (Some(n), _) => Ok(Some(crate::page::total_pages(n, self.items_per_page))),
            (None, Pagination::Keyset) => Ok(None),
            (None, Pagination::Offset) => Err(DataError::count_unsupported(self.query.entity())),
        }
    }

    fn adapter(&self) -> &PageAdapter {
        self.adapter.get_or_init(|| {
            PageAdapter::new(
                &self.query,
                self.items_per_page,
                self.pagination,
                self.seek_method,
                self.boundary_fields.as_deref(),
            )
        })
    }

    pub fn first_page_identifier(&self) -> PageIdentifier {
        self.adapter().first_identifier()
    }

    pub async fn page(&self, identifier: &PageIdentifier) -> Result<Page<E>, DataError> {
        let page = self.adapter().page(self.store.as_ref(), identifier).await?;
        Ok(page.with_total(self.count.get()))
    }

    pub async fn first_page(&self) -> Result<Page<E>, DataError> {
        self.page(&self.first_page_identifier()).await
    }

    /// The last page. Offset pagination resolves the count to locate it;
    /// keyset pagination seeks backward from the end.
    pub async fn last_page(&self) -> Result<Page<E>, DataError> {
        let total = match self.pagination {
            Pagination::Offset => Some(self.count().await?),
            Pagination::Keyset => self.count.get(),
        };
        let identifier = self.adapter().last_identifier(total)?;
        self.page(&identifier).await
    }

    pub async fn next_page(&self, page: &Page<E>) -> Result<Option<Page<E>>, DataError> {
        match page.next_identifier() {
            Some(identifier) => self.page(identifier).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn previous_page(&self, page: &Page<E>) -> Result<Option<Page<E>>, DataError> {
        match page.previous_identifier() {
            Some(identifier) => self.page(identifier).await.map(Some),
            None => Ok(None),
        }
    }

    /// Walk every page from the first.
    ///
    /// ```ignore
    /// let mut pages = pageable.pages();
    /// while let Some(page) = pages.next_page().await? {
    ///     // ...
    /// }
    /// ```
    pub fn pages(&self) -> Pages<'_, E, S> {
        Pages {
            pageable: self,
            next: Some(self.first_page_identifier()),
        }
    }
}

impl<E, S> Clone for QueryPageable<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    /// Clones share the store but not the memoized count or page adapter.
    fn clone(&self) -> Self {
        self.derived(CountCell::default())
    }
}

impl<E, S> fmt::Debug for QueryPageable<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPageable")
            .field("query", &self.query)
            .field("count_strategy", &self.count_strategy)
            .field("pagination", &self.pagination)
            .field("seek_method", &self.seek_method)
            .field("items_per_page", &self.items_per_page)
            .field("boundary_fields", &self.boundary_fields)
            .field("cached_count", &self.count.get())
            .finish()
    }
}

/// Sequential page traversal, see [`QueryPageable::pages`].
pub struct Pages<'a, E, S> {
    pageable: &'a QueryPageable<E, S>,
    next: Option<PageIdentifier>,
}

impl<E, S> Pages<'_, E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    pub async fn next_page(&mut self) -> Result<Option<Page<E>>, DataError> {
        let Some(identifier) = self.next.take() else {
            return Ok(None);
        };
        let page = self.pageable.page(&identifier).await?;
        self.next = page.next_identifier().cloned();
        Ok(Some(page))
    }
}

pub(crate) fn validate_page_size(items_per_page: u64) -> Result<(), DataError> {
    if items_per_page == 0 {
        return Err(DataError::configuration("items_per_page must be at least 1"));
    }
    if items_per_page > MAX_ITEMS_PER_PAGE {
        return Err(DataError::configuration(format!(
            "items_per_page must be at most {MAX_ITEMS_PER_PAGE}"
        )));
    }
    Ok(())
}

/// Boundary fields must lead the keyset ordering and include the index
/// field, so that the recorded values still pin down a single row.
pub(crate) fn validate_boundary_fields(
    query: &QueryDescriptor,
    fields: Option<&[String]>,
) -> Result<(), DataError> {
    let Some(fields) = fields else {
        return Ok(());
    };
    let order = query.order().with_tiebreaker(query.index_by());
    let leading = fields.len() <= order.len()
        && fields
            .iter()
            .zip(order.fields())
            .all(|(field, (ordered, _))| field == ordered);
    if !leading {
        return Err(DataError::configuration(format!(
            "boundary fields {fields:?} must lead the ordering {:?}",
            order.fields().iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>()
        )));
    }
    if !fields.iter().any(|field| field == query.index_by()) {
        return Err(DataError::configuration(format!(
            "boundary fields {fields:?} must include the index field `{}`",
            query.index_by()
        )));
    }
    Ok(())
}

/// Entity-dependent checks: a single-column key and known index and ordering
/// columns.
pub(crate) fn validate_query<E: Entity>(query: &QueryDescriptor) -> Result<(), DataError> {
    entity::single_key_column::<E>()?;
    entity::ensure_column::<E>(query.index_by(), "index field")?;
    for (field, _) in query.order().fields() {
        entity::ensure_column::<E>(field, "ordering field")?;
    }
    Ok(())
}
