//! The page adapter: turns page identifiers into windowed queries.
//!
//! Every page query fetches one row more than the page size. The extra row
//! only tells whether another page exists in the traversal direction and is
//! never returned.

use crate::descriptor::QueryDescriptor;
use crate::entity::Entity;
use crate::error::DataError;
use crate::items::KeyedItems;
use crate::order::Direction;
use crate::page::{Boundary, Page, PageIdentifier, SeekDirection};
use crate::pagination::{Pagination, SeekMethod};
use crate::query::{Condition, SeekTerm};
use crate::store::EntityStore;
use crate::value::Value;

#[derive(Debug, Clone)]
pub(crate) struct PageAdapter {
    query: QueryDescriptor,
    items_per_page: u64,
    pagination: Pagination,
    seek_method: SeekMethod,
    /// Leading ordering fields recorded in boundaries.
    boundary_len: usize,
}

impl PageAdapter {
    /// The index field is appended to the ordering so that every row has a
    /// unique position, which keyset seeks depend on. Boundaries record the
    /// `boundary_fields` prefix of that ordering, or all of it.
    pub(crate) fn new(
        query: &QueryDescriptor,
        items_per_page: u64,
        pagination: Pagination,
        seek_method: SeekMethod,
        boundary_fields: Option<&[String]>,
    ) -> Self {
        let order = query.order().with_tiebreaker(query.index_by());
        let boundary_len = boundary_fields
            .map_or(order.len(), |fields| fields.len().min(order.len()));
        tracing::debug!(
            entity = query.entity(),
            items_per_page,
            ?pagination,
            boundary_len,
            "page adapter realized"
        );
        Self {
            query: query.with_order(order),
            items_per_page,
            pagination,
            seek_method,
            boundary_len,
        }
    }

    /// Rows fetched per page: one more than the page size.
    fn fetch_size(&self) -> u64 {
        self.items_per_page.saturating_add(1)
    }

    fn boundary_order(&self) -> &[(String, Direction)] {
        &self.query.order().fields()[..self.boundary_len]
    }

    pub(crate) fn first_identifier(&self) -> PageIdentifier {
        match self.pagination {
            Pagination::Offset => PageIdentifier::Offset { number: 1 },
            Pagination::Keyset => PageIdentifier::Keyset {
                boundary: None,
                direction: SeekDirection::Forward,
                number: Some(1),
            },
        }
    }

    /// Identifier of the last page. Offset pagination needs the total count;
    /// keyset pagination seeks backward from the end and only uses the count
    /// to number the page.
    pub(crate) fn last_identifier(&self, total: Option<u64>) -> Result<PageIdentifier, DataError> {
        let last = total.map(|n| crate::page::total_pages(n, self.items_per_page).max(1));
        match self.pagination {
            Pagination::Offset => last
                .map(|number| PageIdentifier::Offset { number })
                .ok_or_else(|| DataError::count_unsupported(self.query.entity())),
            Pagination::Keyset => Ok(PageIdentifier::Keyset {
                boundary: None,
                direction: SeekDirection::Backward,
                number: last,
            }),
        }
    }

    pub(crate) async fn page<E, S>(&self, store: &S, id: &PageIdentifier) -> Result<Page<E>, DataError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        match (self.pagination, id) {
            (Pagination::Offset, PageIdentifier::Offset { number }) => {
                self.offset_page(store, *number).await
            }
            (
                Pagination::Keyset,
                PageIdentifier::Keyset {
                    boundary,
                    direction: SeekDirection::Forward,
                    number,
                },
            ) => self.keyset_forward(store, boundary.as_ref(), *number).await,
            (
                Pagination::Keyset,
                PageIdentifier::Keyset {
                    boundary,
                    direction: SeekDirection::Backward,
                    number,
                },
            ) => self.keyset_backward(store, boundary.as_ref(), *number).await,
            _ => Err(DataError::InvalidArgument(format!(
                "page identifier does not match {:?} pagination",
                self.pagination
            ))),
        }
    }

    async fn offset_page<E, S>(&self, store: &S, number: u64) -> Result<Page<E>, DataError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        if number == 0 {
            return Err(DataError::InvalidArgument("page numbers start at 1".into()));
        }
        let per_page = self.items_per_page;
        let offset = (number - 1).saturating_mul(per_page);
        let query = self.query.windowed(Some(offset), Some(self.fetch_size()));
        tracing::debug!(entity = query.entity(), number, offset, "fetching offset page");

        let mut items = KeyedItems::from_rows(store.fetch(&query).await?, query.index_by());
        let has_next = items.len() as u64 > per_page;
        items.truncate(per_page as usize);

        let next = number
            .checked_add(1)
            .filter(|_| has_next)
            .map(|number| PageIdentifier::Offset { number });
        let previous = (number > 1).then(|| PageIdentifier::Offset { number: number - 1 });
        Ok(Page::new(
            PageIdentifier::Offset { number },
            per_page,
            items,
            next,
            previous,
        ))
    }

    async fn keyset_forward<E, S>(
        &self,
        store: &S,
        boundary: Option<&Boundary>,
        number: Option<u64>,
    ) -> Result<Page<E>, DataError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        let per_page = self.items_per_page;
        let number = if boundary.is_none() { Some(1) } else { number };
        let mut query = self.query.windowed(None, Some(self.fetch_size()));
        if let Some(boundary) = boundary {
            let values = self.seek_values(store, boundary).await?;
            query = query.with_condition(seek_condition(self.boundary_order(), &values, false));
        }
        tracing::debug!(entity = query.entity(), ?number, "fetching keyset page forward");

        let rows = store.fetch(&query).await?;
        let has_more = rows.len() as u64 > per_page;
        let mut items = KeyedItems::from_rows(rows, query.index_by());
        items.truncate(per_page as usize);

        let next = match (has_more, self.edge(items.last())) {
            (true, Some(edge)) => Some(PageIdentifier::Keyset {
                boundary: Some(edge),
                direction: SeekDirection::Forward,
                number: number.and_then(|n| n.checked_add(1)),
            }),
            _ => None,
        };
        let previous = match (boundary, self.edge(items.first())) {
            (None, _) => None,
            (Some(_), Some(edge)) => Some(PageIdentifier::Keyset {
                boundary: Some(edge),
                direction: SeekDirection::Backward,
                number: number.and_then(|n| n.checked_sub(1)).filter(|n| *n > 0),
            }),
            // Nothing left after the boundary: step back from the end.
            (Some(_), None) => Some(PageIdentifier::Keyset {
                boundary: None,
                direction: SeekDirection::Backward,
                number: None,
            }),
        };
        let identifier = PageIdentifier::Keyset {
            boundary: boundary.cloned(),
            direction: SeekDirection::Forward,
            number,
        };
        Ok(Page::new(identifier, per_page, items, next, previous))
    }

    async fn keyset_backward<E, S>(
        &self,
        store: &S,
        boundary: Option<&Boundary>,
        number: Option<u64>,
    ) -> Result<Page<E>, DataError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        let per_page = self.items_per_page;
        let reversed = self.query.order().reversed();
        let mut query = self
            .query
            .with_order(reversed)
            .windowed(None, Some(self.fetch_size()));
        if let Some(boundary) = boundary {
            let values = self.seek_values(store, boundary).await?;
            query = query.with_condition(seek_condition(self.boundary_order(), &values, true));
        }
        tracing::debug!(entity = query.entity(), ?number, "fetching keyset page backward");

        let rows = store.fetch(&query).await?;
        if rows.len() as u64 <= per_page {
            // Reached the start: serve the canonical first page so that page
            // boundaries stay stable.
            return self.keyset_forward(store, None, Some(1)).await;
        }
        let mut items = KeyedItems::from_rows(rows, query.index_by());
        items.truncate(per_page as usize);
        items.reverse();

        let previous = self.edge(items.first()).map(|edge| PageIdentifier::Keyset {
            boundary: Some(edge),
            direction: SeekDirection::Backward,
            number: number.and_then(|n| n.checked_sub(1)).filter(|n| *n > 0),
        });
        let next = match (boundary, self.edge(items.last())) {
            (Some(_), Some(edge)) => Some(PageIdentifier::Keyset {
                boundary: Some(edge),
                direction: SeekDirection::Forward,
                number: number.and_then(|n| n.checked_add(1)),
            }),
            _ => None,
        };
        let identifier = PageIdentifier::Keyset {
            boundary: boundary.cloned(),
            direction: SeekDirection::Backward,
            number,
        };
        Ok(Page::new(identifier, per_page, items, next, previous))
    }

    /// Values to seek from. Exact seeks re-read the boundary row and fall
    /// back to the recorded values when it no longer exists.
    async fn seek_values<E, S>(&self, store: &S, boundary: &Boundary) -> Result<Vec<Value>, DataError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        if boundary.values.len() != self.boundary_len {
            return Err(DataError::InvalidArgument(
                "page identifier does not match the query ordering".into(),
            ));
        }
        if self.seek_method == SeekMethod::Approximated {
            return Ok(boundary.values.clone());
        }
        let lookup = QueryDescriptor::new(self.query.entity(), self.query.alias(), self.query.index_by())
            .with_condition(Condition::Eq(self.query.index_by().to_string(), boundary.key.clone()))
            .windowed(None, Some(1));
        let row = store.fetch(&lookup).await?.into_iter().next();
        match row {
            Some(row) => Ok(self.boundary_values(&row)),
            None => {
                tracing::debug!(
                    entity = self.query.entity(),
                    key = %boundary.key,
                    "boundary row gone, seeking from recorded values"
                );
                Ok(boundary.values.clone())
            }
        }
    }

    fn boundary_values<E: Entity>(&self, row: &E) -> Vec<Value> {
        self.boundary_order()
            .iter()
            .map(|(field, _)| row.value(field).unwrap_or(Value::Null))
            .collect()
    }

    fn edge<E: Entity>(&self, entry: Option<(&Value, &E)>) -> Option<Boundary> {
        entry.map(|(key, row)| Boundary {
            key: key.clone(),
            values: self.boundary_values(row),
        })
    }
}

/// Rows strictly after `values` in `order`, or strictly before when
/// `backward` is set.
fn seek_condition(order: &[(String, Direction)], values: &[Value], backward: bool) -> Condition {
    Condition::Seek(
        order
            .iter()
            .zip(values)
            .map(|((column, direction), value)| SeekTerm {
                column: column.clone(),
                direction: if backward { direction.reverse() } else { *direction },
                value: value.clone(),
            })
            .collect(),
    )
}
