//! # recollect-data-sqlx: SQLite backend for recollect-data
//!
//! This crate provides a [SQLx](https://github.com/launchbadge/sqlx) SQLite
//! implementation of the persistence collaborator used by `recollect-data`.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqliteStore`] | `EntityStore` over a `SqlitePool`, with staged writes |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` into `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! Entities read through the store implement both `Entity` and
//! `sqlx::FromRow`:
//!
//! ```ignore
//! #[derive(Clone, sqlx::FromRow)]
//! struct UserEntity { id: i64, name: String }
//!
//! let store = Arc::new(SqliteStore::<UserEntity>::new(pool));
//! let users = Repository::new(store.clone())?;
//! let first = users.first_page().await?;
//! ```
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead.

pub mod error;
pub mod store;

pub use error::{SqlxErrorExt, SqlxResult};
pub use store::SqliteStore;

/// Re-exports of the most commonly used types from both `recollect-data` and this crate.
pub mod prelude {
    pub use crate::{SqliteStore, SqlxErrorExt};
    pub use recollect_data::prelude::*;
}
