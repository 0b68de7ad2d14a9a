use crate::entity::Entity;
use crate::error::DataError;
use crate::store::EntityStore;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// A lazy handle to an entity by key.
///
/// Creating a reference never queries. The row is looked up on the first
/// [`Reference::load`]; a missing row surfaces as [`DataError::NotFound`]
/// at that point.
pub struct Reference<E: Entity, S> {
    store: Arc<S>,
    key: E::Key,
    loaded: OnceCell<E>,
}

impl<E, S> Reference<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    pub(crate) fn new(store: Arc<S>, key: E::Key) -> Self {
        Self {
            store,
            key,
            loaded: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &E::Key {
        &self.key
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub async fn load(&self) -> Result<&E, DataError> {
        self.loaded
            .get_or_try_init(|| async {
                self.store.find(&self.key).await?.ok_or_else(|| {
                    let key: Value = self.key.clone().into();
                    DataError::NotFound(format!("{} with key {key}", E::entity_name()))
                })
            })
            .await
    }

    /// The entity if it was loaded already.
    pub fn get(&self) -> Option<&E> {
        self.loaded.get()
    }
}

impl<E: Entity, S> fmt::Debug for Reference<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("entity", &E::entity_name())
            .field("key", &self.key)
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}
