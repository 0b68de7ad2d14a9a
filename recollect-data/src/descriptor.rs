//! Query descriptors: an entity type, a selection alias, an index field, an
//! ordering and a set of filter conditions.
//!
//! Every `with_*` method returns a new descriptor holding a deep copy of the
//! builder state. Nothing in a derived descriptor is shared with its parent.

use crate::entity::{self, Entity};
use crate::error::DataError;
use crate::order::{Direction, OrderBy, OrderByInput};
use crate::query::{Condition, QueryBuilder};
use crate::value::Value;

/// Filter conditions with an optional ordering of their own.
///
/// ```ignore
/// let criteria = Criteria::new()
///     .eq("status", "active")
///     .gt("age", 18)
///     .order_by("name", Direction::Asc);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    conditions: Vec<Condition>,
    order: Vec<(String, Direction)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Eq(column.to_string(), value.into()))
    }

    pub fn not_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::NotEq(column.to_string(), value.into()))
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(Condition::Like(column.to_string(), pattern.to_string()))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Gt(column.to_string(), value.into()))
    }

    pub fn ge(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Ge(column.to_string(), value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Lt(column.to_string(), value.into()))
    }

    pub fn le(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Le(column.to_string(), value.into()))
    }

    pub fn is_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Condition::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Condition::IsNull(column.to_string()))
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.filter(Condition::IsNotNull(column.to_string()))
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn has_ordering(&self) -> bool {
        !self.order.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    entity: String,
    alias: String,
    index_by: String,
    order: OrderBy,
    builder: QueryBuilder,
}

impl QueryDescriptor {
    /// A descriptor selecting every row of `entity`, in the default ordering
    /// for `index_by` (see [`OrderBy::default_for`]).
    pub fn new(entity: &str, alias: &str, index_by: &str) -> Self {
        let order = OrderBy::default_for(index_by);
        let mut builder = QueryBuilder::new(entity).alias(alias);
        builder.set_order(&order);
        Self {
            entity: entity.to_string(),
            alias: alias.to_string(),
            index_by: index_by.to_string(),
            order,
            builder,
        }
    }

    /// Like [`QueryDescriptor::new`], checked against the entity's metadata:
    /// the key must be single-column and `index_by` must be a known column.
    pub fn for_entity<E: Entity>(alias: &str, index_by: &str) -> Result<Self, DataError> {
        entity::single_key_column::<E>()?;
        entity::ensure_column::<E>(index_by, "index field")?;
        Ok(Self::new(E::entity_name(), alias, index_by))
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn index_by(&self) -> &str {
        &self.index_by
    }

    pub fn order(&self) -> &OrderBy {
        &self.order
    }

    pub fn conditions(&self) -> &[Condition] {
        self.builder.conditions()
    }

    /// The builder state, ordering included.
    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Derive a descriptor with a normalized ordering.
    pub fn with_ordering(&self, input: impl Into<OrderByInput>) -> Result<Self, DataError> {
        Ok(self.with_order(OrderBy::normalize(Some(input.into()), &self.index_by)?))
    }

    pub fn with_order(&self, order: OrderBy) -> Self {
        let mut out = self.clone();
        out.builder.set_order(&order);
        out.order = order;
        out
    }

    /// Derive a descriptor with the criteria's conditions added. An ordering
    /// carried by the criteria replaces the current one; otherwise the current
    /// ordering is kept.
    pub fn with_filter(&self, criteria: &Criteria) -> Result<Self, DataError> {
        let mut out = self.clone();
        out.builder.extend_conditions(criteria.conditions.iter().cloned());
        if criteria.has_ordering() {
            let order = OrderBy::from_pairs(criteria.order.iter().cloned())?;
            out.builder.set_order(&order);
            out.order = order;
        }
        Ok(out)
    }

    pub fn with_condition(&self, condition: Condition) -> Self {
        let mut out = self.clone();
        out.builder.push_condition(condition);
        out
    }

    pub fn with_index_by(&self, index_by: &str) -> Self {
        let mut out = self.clone();
        out.index_by = index_by.to_string();
        out
    }

    /// Derive a descriptor by mutating a copy of the builder. An ordering set
    /// through the builder is normalized; clearing it restores the previous
    /// ordering.
    pub fn update_builder(&self, update: impl FnOnce(&mut QueryBuilder)) -> Result<Self, DataError> {
        let mut out = self.clone();
        update(&mut out.builder);
        if out.builder.ordering().is_empty() {
            out.builder.set_order(&self.order);
        } else {
            out.order = OrderBy::from_pairs(out.builder.ordering().iter().cloned())?;
            out.builder.set_order(&out.order);
        }
        Ok(out)
    }

    /// Same filters and ordering, restricted to a window of rows.
    pub(crate) fn windowed(&self, offset: Option<u64>, limit: Option<u64>) -> Self {
        let mut out = self.clone();
        out.builder.set_window(offset, limit);
        out
    }

    /// Same filters, no ordering and no window: what a count query needs.
    pub fn count_query(&self) -> QueryBuilder {
        let mut builder = self.builder.clone();
        builder.clear_order();
        builder.set_window(None, None);
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> QueryDescriptor {
        QueryDescriptor::new("users", "e", "id")
            .with_ordering(vec![("name", Direction::Asc)])
            .unwrap()
    }

    #[test]
    fn test_new_uses_default_ordering() {
        let d = QueryDescriptor::new("users", "e", "id");
        assert_eq!(d.order(), &crate::config::defaults().order_by);
        assert_eq!(d.builder().ordering(), d.order().fields());

        let keyed = QueryDescriptor::new("devices", "e", "uuid");
        assert_eq!(keyed.order(), &OrderBy::asc("uuid"));
    }

    #[test]
    fn test_filter_without_ordering_keeps_descriptor_ordering() {
        let d = base().with_filter(&Criteria::new().eq("active", true)).unwrap();
        assert_eq!(d.order(), &OrderBy::asc("name"));
        assert_eq!(d.conditions().len(), 1);
    }

    #[test]
    fn test_filter_ordering_replaces_descriptor_ordering() {
        let d = base()
            .with_filter(&Criteria::new().eq("active", true).order_by("age", Direction::Desc))
            .unwrap();
        assert_eq!(d.order(), &OrderBy::desc("age"));
        assert!(!d.order().contains("name"));
    }

    #[test]
    fn test_derivation_does_not_touch_original() {
        let a = base();
        let b = a.with_filter(&Criteria::new().gt("age", 30)).unwrap();
        let c = b.with_ordering("age").unwrap();
        assert!(a.conditions().is_empty());
        assert_eq!(a.order(), &OrderBy::asc("name"));
        assert_eq!(b.conditions().len(), 1);
        assert_eq!(c.order(), &OrderBy::asc("age"));
        assert_eq!(b.order(), &OrderBy::asc("name"));
    }

    #[test]
    fn test_update_builder_normalizes_ordering() {
        let d = base()
            .update_builder(|b| {
                b.clear_order();
                *b = b.clone().order_by("age", Direction::Desc).order_by("age", Direction::Asc);
            })
            .unwrap();
        assert_eq!(d.order(), &OrderBy::asc("age"));

        let cleared = base().update_builder(|b| b.clear_order()).unwrap();
        assert_eq!(cleared.order(), &OrderBy::asc("name"));
        assert!(!cleared.builder().ordering().is_empty());
    }

    #[test]
    fn test_count_query_strips_ordering_and_window() {
        let d = base().windowed(Some(10), Some(5));
        let count = d.count_query();
        assert!(count.ordering().is_empty());
        assert_eq!(count.limit_value(), None);
        assert_eq!(d.builder().limit_value(), Some(5));
    }
}
