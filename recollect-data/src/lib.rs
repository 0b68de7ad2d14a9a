//! Lazy, pageable and countable collections over persisted entities.
//!
//! A [`Repository`] presents every row of an entity type as a keyed
//! collection. Nothing is fetched until it is needed: pages are read through a
//! page adapter built on first use, totals are resolved through a pluggable
//! [`CountStrategy`], and full materialization is bounded by soft and hard
//! [`Limits`].
//!
//! Persistence is delegated to an [`EntityStore`]. This crate ships an
//! [`InMemoryStore`]; `recollect-data-sqlx` provides a SQLite one.

mod adapter;
pub mod config;
pub mod contract;
pub mod count;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod items;
pub mod memory;
pub mod order;
pub mod page;
pub mod pageable;
pub mod pagination;
pub mod query;
pub mod recollection;
pub mod reference;
pub mod repository;
pub mod safeguard;
pub mod store;
pub mod value;

pub use config::{defaults, set_defaults, Defaults, RepositoryConfig};
pub use contract::{Counter, Pager};
pub use count::{CountResult, CountStrategy, CountStrategyKind, Delegate, Provided, Restrict};
pub use descriptor::{Criteria, QueryDescriptor};
pub use entity::Entity;
pub use error::DataError;
pub use items::{KeyTransformer, KeyedItems};
pub use memory::{InMemoryStore, StoreStats};
pub use order::{Direction, OrderBy, OrderByInput};
pub use page::{Boundary, Page, PageIdentifier, SeekDirection};
pub use pageable::{Pages, QueryPageable, MAX_ITEMS_PER_PAGE};
pub use pagination::{Pagination, SeekMethod};
pub use query::{Condition, QueryBuilder, QueryError};
pub use recollection::QueryRecollection;
pub use reference::Reference;
pub use repository::Repository;
pub use safeguard::{materialize, Limits, Materialized};
pub use store::{BoxFuture, DatabaseSession, EntityStore, RowCounter};
pub use value::Value;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        Counter, CountStrategyKind, Criteria, DataError, DatabaseSession, Direction, Entity,
        EntityStore, Page, PageIdentifier, Pager, Pagination, QueryDescriptor, QueryPageable,
        QueryRecollection, Repository, RepositoryConfig, SeekMethod, Value,
    };
}
