//! Capability traits shared by pageables, recollections and repositories.
//!
//! Uses RPITIT (return-position `impl Trait` in traits), so code can be
//! generic over anything countable or pageable without boxing.

use crate::entity::Entity;
use crate::error::DataError;
use crate::page::{Page, PageIdentifier};
use crate::pageable::QueryPageable;
use crate::recollection::QueryRecollection;
use crate::repository::Repository;
use crate::store::EntityStore;
use std::future::Future;

pub trait Counter: Send + Sync {
    /// Exact number of matching rows, or [`DataError::CountUnsupported`].
    fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Number of pages; `None` when unknown and not required by the
    /// pagination mode.
    fn page_count(&self) -> impl Future<Output = Result<Option<u64>, DataError>> + Send;
}

pub trait Pager<E: Entity>: Send + Sync {
    fn items_per_page(&self) -> u64;

    fn first_page(&self) -> impl Future<Output = Result<Page<E>, DataError>> + Send;

    fn last_page(&self) -> impl Future<Output = Result<Page<E>, DataError>> + Send;

    fn page(&self, identifier: &PageIdentifier) -> impl Future<Output = Result<Page<E>, DataError>> + Send;
}

impl<E, S> Counter for QueryPageable<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send {
        QueryPageable::count(self)
    }

    fn page_count(&self) -> impl Future<Output = Result<Option<u64>, DataError>> + Send {
        QueryPageable::page_count(self)
    }
}

impl<E, S> Pager<E> for QueryPageable<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    fn items_per_page(&self) -> u64 {
        QueryPageable::items_per_page(self)
    }

    fn first_page(&self) -> impl Future<Output = Result<Page<E>, DataError>> + Send {
        QueryPageable::first_page(self)
    }

    fn last_page(&self) -> impl Future<Output = Result<Page<E>, DataError>> + Send {
        QueryPageable::last_page(self)
    }

    fn page(&self, identifier: &PageIdentifier) -> impl Future<Output = Result<Page<E>, DataError>> + Send {
        QueryPageable::page(self, identifier)
    }
}

macro_rules! delegate_to_pageable {
    ($ty:ident) => {
        impl<E, S> Counter for $ty<E, S>
        where
            E: Entity,
            S: EntityStore<E>,
        {
            fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send {
                Counter::count(self.pageable())
            }

            fn page_count(&self) -> impl Future<Output = Result<Option<u64>, DataError>> + Send {
                Counter::page_count(self.pageable())
            }
        }

        impl<E, S> Pager<E> for $ty<E, S>
        where
            E: Entity,
            S: EntityStore<E>,
        {
            fn items_per_page(&self) -> u64 {
                Pager::items_per_page(self.pageable())
            }

            fn first_page(&self) -> impl Future<Output = Result<Page<E>, DataError>> + Send {
                Pager::first_page(self.pageable())
            }

            fn last_page(&self) -> impl Future<Output = Result<Page<E>, DataError>> + Send {
                Pager::last_page(self.pageable())
            }

            fn page(
                &self,
                identifier: &PageIdentifier,
            ) -> impl Future<Output = Result<Page<E>, DataError>> + Send {
                Pager::page(self.pageable(), identifier)
            }
        }
    };
}

delegate_to_pageable!(QueryRecollection);
delegate_to_pageable!(Repository);
