use crate::descriptor::QueryDescriptor;
use crate::entity::Entity;
use crate::error::DataError;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The counting half of a store, split out so count strategies can hold it as
/// a trait object without knowing the entity type.
pub trait RowCounter: Send + Sync {
    /// Number of rows matching the descriptor's filters. Ordering and any
    /// window are ignored.
    fn count<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, Result<u64, DataError>>;
}

/// The persistence collaborator: executes descriptors and tracks entity
/// identity.
///
/// `persist` and `remove` only stage writes. Making them durable is the job
/// of the store's [`DatabaseSession::flush`].
///
/// Methods return boxed futures so that stores can be used as trait objects.
pub trait EntityStore<E: Entity>: RowCounter + 'static {
    /// Rows matching the descriptor, in its order, honoring its limit and
    /// offset.
    fn fetch<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, Result<Vec<E>, DataError>>;

    fn find<'a>(&'a self, key: &'a E::Key) -> BoxFuture<'a, Result<Option<E>, DataError>>;

    fn persist(&self, entity: E) -> BoxFuture<'_, Result<(), DataError>>;

    fn remove<'a>(&'a self, entity: &'a E) -> BoxFuture<'a, Result<(), DataError>>;

    /// Whether the store currently manages this entity's identity.
    fn contains(&self, entity: &E) -> bool;
}

/// Unit-of-work control over a store's staged writes.
pub trait DatabaseSession: Send + Sync {
    /// Apply all staged writes.
    fn flush(&self) -> BoxFuture<'_, Result<(), DataError>>;

    /// Drop staged writes and forget every managed identity.
    fn clear(&self);
}
