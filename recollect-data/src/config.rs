//! Repository configuration and process-wide defaults.
//!
//! ```yaml
//! index_by: id
//! order_by:
//!   created_at: desc
//! items_per_page: 25
//! count: delegate
//! pagination: keyset
//! seek_method: exact
//! soft_limit: 500
//! hard_limit: 10000
//! boundary_fields: [created_at, id]
//! ```

use crate::count::{CountStrategy, CountStrategyKind};
use crate::error::DataError;
use crate::items::KeyTransformer;
use crate::order::{OrderBy, OrderByInput};
use crate::pageable::validate_page_size;
use crate::pagination::{Pagination, SeekMethod};
use crate::safeguard::Limits;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Values used whenever a configuration leaves a setting out.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub index_by: String,
    pub alias: String,
    pub items_per_page: u64,
    pub pagination: Pagination,
    pub seek_method: SeekMethod,
    pub order_by: OrderBy,
    pub count: CountStrategyKind,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            index_by: "id".into(),
            alias: "e".into(),
            items_per_page: 50,
            pagination: Pagination::Keyset,
            seek_method: SeekMethod::Approximated,
            order_by: OrderBy::asc("id"),
            count: CountStrategyKind::Restrict,
        }
    }
}

static DEFAULTS: OnceLock<Defaults> = OnceLock::new();

/// Install process-wide defaults. Only the first call takes effect; returns
/// `false` if defaults were already installed or read.
pub fn set_defaults(defaults: Defaults) -> bool {
    DEFAULTS.set(defaults).is_ok()
}

/// The process-wide defaults. Reading them freezes them.
pub fn defaults() -> &'static Defaults {
    DEFAULTS.get_or_init(Defaults::default)
}

/// Settings of a repository or query recollection. Unset fields fall back to
/// [`defaults()`].
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    pub index_by: Option<String>,
    pub alias: Option<String>,
    pub order_by: Option<OrderByInput>,
    pub items_per_page: Option<u64>,
    pub count: Option<CountStrategyKind>,
    pub soft_limit: Option<u64>,
    pub hard_limit: Option<u64>,
    pub pagination: Option<Pagination>,
    pub seek_method: Option<SeekMethod>,
    /// Ordering fields recorded in keyset boundaries; all of them when unset.
    pub boundary_fields: Option<Vec<String>>,
    /// A custom strategy, taking precedence over `count`.
    #[serde(skip)]
    pub count_strategy: Option<Arc<dyn CountStrategy>>,
    /// Applied to keys passed to loaded-item lookups.
    #[serde(skip)]
    pub key_transformer: Option<Arc<dyn KeyTransformer>>,
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("index_by", &self.index_by)
            .field("alias", &self.alias)
            .field("order_by", &self.order_by)
            .field("items_per_page", &self.items_per_page)
            .field("count", &self.count_strategy.as_ref().map_or_else(
                || format!("{:?}", self.count),
                |s| format!("{s:?}"),
            ))
            .field("soft_limit", &self.soft_limit)
            .field("hard_limit", &self.hard_limit)
            .field("pagination", &self.pagination)
            .field("seek_method", &self.seek_method)
            .field("boundary_fields", &self.boundary_fields)
            .field("key_transformer", &self.key_transformer.is_some())
            .finish()
    }
}

impl RepositoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DataError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| DataError::configuration(format!("invalid repository config: {e}")))
    }

    pub fn with_index_by(mut self, index_by: impl Into<String>) -> Self {
        self.index_by = Some(index_by.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<OrderByInput>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_items_per_page(mut self, items_per_page: u64) -> Self {
        self.items_per_page = Some(items_per_page);
        self
    }

    pub fn with_count(mut self, count: CountStrategyKind) -> Self {
        self.count = Some(count);
        self.count_strategy = None;
        self
    }

    pub fn with_count_strategy(mut self, strategy: impl CountStrategy) -> Self {
        self.count_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_soft_limit(mut self, soft_limit: u64) -> Self {
        self.soft_limit = Some(soft_limit);
        self
    }

    pub fn with_hard_limit(mut self, hard_limit: u64) -> Self {
        self.hard_limit = Some(hard_limit);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_seek_method(mut self, seek_method: SeekMethod) -> Self {
        self.seek_method = Some(seek_method);
        self
    }

    pub fn with_boundary_fields<F: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = F>,
    ) -> Self {
        self.boundary_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_key_transformer(mut self, transformer: impl KeyTransformer) -> Self {
        self.key_transformer = Some(Arc::new(transformer));
        self
    }

    pub fn index_by(&self) -> &str {
        self.index_by.as_deref().unwrap_or(&defaults().index_by)
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&defaults().alias)
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page.unwrap_or(defaults().items_per_page)
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination.unwrap_or(defaults().pagination)
    }

    pub fn seek_method(&self) -> SeekMethod {
        self.seek_method.unwrap_or(defaults().seek_method)
    }

    pub fn order_by(&self) -> Result<OrderBy, DataError> {
        OrderBy::normalize(self.order_by.clone(), self.index_by())
    }

    pub fn limits(&self) -> Result<Limits, DataError> {
        Limits::new(self.soft_limit, self.hard_limit)
    }

    pub fn count_strategy(&self) -> Arc<dyn CountStrategy> {
        match &self.count_strategy {
            Some(strategy) => strategy.clone(),
            None => self.count.unwrap_or(defaults().count).into_strategy(),
        }
    }

    /// Check every setting that does not depend on the entity type.
    pub fn validate(&self) -> Result<(), DataError> {
        validate_page_size(self.items_per_page())?;
        self.order_by()?;
        self.limits()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Direction;

    #[test]
    fn test_from_yaml() {
        let config = RepositoryConfig::from_yaml_str(
            "order_by:\n  name: desc\n  id: asc\nitems_per_page: 25\ncount: delegate\npagination: offset\nhard_limit: 100\n",
        )
        .unwrap();
        assert_eq!(config.items_per_page(), 25);
        assert_eq!(config.pagination(), Pagination::Offset);
        assert_eq!(config.index_by(), "id");
        assert_eq!(
            config.order_by().unwrap().fields(),
            &[
                ("name".to_string(), Direction::Desc),
                ("id".to_string(), Direction::Asc)
            ]
        );
        assert_eq!(config.limits().unwrap().hard(), Some(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = RepositoryConfig::from_yaml_str("items_per_pages: 3").unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_validate() {
        assert!(RepositoryConfig::new().with_items_per_page(0).validate().is_err());
        assert!(RepositoryConfig::new()
            .with_soft_limit(10)
            .with_hard_limit(5)
            .validate()
            .is_err());
        assert!(RepositoryConfig::new()
            .with_order_by(Vec::<(String, Direction)>::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_page_size_upper_bound() {
        let err = RepositoryConfig::new()
            .with_items_per_page(u64::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)), "{err}");
        assert!(RepositoryConfig::new()
            .with_items_per_page(crate::pageable::MAX_ITEMS_PER_PAGE)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_boundary_fields_from_yaml() {
        let config =
            RepositoryConfig::from_yaml_str("order_by: name\nboundary_fields: [name, id]\n").unwrap();
        assert_eq!(
            config.boundary_fields,
            Some(vec!["name".to_string(), "id".to_string()])
        );
    }

    #[test]
    fn test_defaults_apply() {
        let config = RepositoryConfig::new();
        assert_eq!(config.items_per_page(), defaults().items_per_page);
        assert_eq!(config.alias(), "e");
        assert_eq!(config.order_by().unwrap(), defaults().order_by);
    }
}
