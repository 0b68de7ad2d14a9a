//! Ordering specifications and their normalization.
//!
//! An [`OrderBy`] is never empty and never names the same field twice. Keyset
//! pagination relies on both properties to derive a deterministic total order.

use crate::error::DataError;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "asc", alias = "ASC", alias = "Asc", alias = "ascending")]
    Asc,
    #[serde(rename = "desc", alias = "DESC", alias = "Desc", alias = "descending")]
    Desc,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, Direction::Asc)
    }

    pub(crate) fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Raw ordering input, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByInput {
    /// A single field, ascending.
    Field(String),
    /// Field to direction pairs, in priority order.
    Fields(Vec<(String, Direction)>),
}

impl From<&str> for OrderByInput {
    fn from(field: &str) -> Self {
        OrderByInput::Field(field.to_string())
    }
}

impl From<String> for OrderByInput {
    fn from(field: String) -> Self {
        OrderByInput::Field(field)
    }
}

impl<S: Into<String>> From<Vec<(S, Direction)>> for OrderByInput {
    fn from(pairs: Vec<(S, Direction)>) -> Self {
        OrderByInput::Fields(pairs.into_iter().map(|(f, d)| (f.into(), d)).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[(S, Direction); N]> for OrderByInput {
    fn from(pairs: [(S, Direction); N]) -> Self {
        OrderByInput::Fields(pairs.into_iter().map(|(f, d)| (f.into(), d)).collect())
    }
}

/// A normalized, non-empty ordering with unique field names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy(Vec<(String, Direction)>);

impl OrderBy {
    /// Ascending order on a single field.
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy(vec![(field.into(), Direction::Asc)])
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy(vec![(field.into(), Direction::Desc)])
    }

    /// The ordering used when none is configured: the process-wide default
    /// for the default index field, ascending on `index_by` otherwise.
    pub fn default_for(index_by: &str) -> Self {
        let defaults = crate::config::defaults();
        if index_by == defaults.index_by {
            defaults.order_by.clone()
        } else {
            OrderBy::asc(index_by)
        }
    }

    /// Normalize raw input. Absent input falls back to
    /// [`OrderBy::default_for`]; an empty field list is rejected.
    pub fn normalize(input: Option<OrderByInput>, index_by: &str) -> Result<Self, DataError> {
        match input {
            None => Ok(Self::default_for(index_by)),
            Some(OrderByInput::Field(field)) => Self::from_pairs([(field, Direction::Asc)]),
            Some(OrderByInput::Fields(pairs)) => Self::from_pairs(pairs),
        }
    }

    /// Build from pairs. A repeated field keeps its first position and takes
    /// the direction of its last occurrence.
    pub fn from_pairs<S, I>(pairs: I) -> Result<Self, DataError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Direction)>,
    {
        let mut out: Vec<(String, Direction)> = Vec::new();
        for (field, direction) in pairs {
            let field = field.into();
            if field.is_empty() {
                return Err(DataError::configuration("ordering field name cannot be empty"));
            }
            match out.iter_mut().find(|(existing, _)| *existing == field) {
                Some(slot) => slot.1 = direction,
                None => out.push((field, direction)),
            }
        }
        if out.is_empty() {
            return Err(DataError::configuration("ordering cannot be empty"));
        }
        Ok(OrderBy(out))
    }

    pub fn fields(&self) -> &[(String, Direction)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|(f, _)| f == field)
    }

    /// Append `field` ascending unless it is already part of the ordering, so
    /// that rows tied on every other field still have a total order.
    pub fn with_tiebreaker(&self, field: &str) -> Self {
        let mut out = self.clone();
        if !out.contains(field) {
            out.0.push((field.to_string(), Direction::Asc));
        }
        out
    }

    /// The same fields with every direction flipped.
    pub fn reversed(&self) -> Self {
        OrderBy(self.0.iter().map(|(f, d)| (f.clone(), d.reverse())).collect())
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, direction) in &self.0 {
            map.serialize_entry(field, direction)?;
        }
        map.end()
    }
}

struct OrderByInputVisitor;

impl<'de> Visitor<'de> for OrderByInputVisitor {
    type Value = OrderByInput;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field name or a map of field names to directions")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(OrderByInput::Field(v.to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut pairs = Vec::new();
        while let Some((field, direction)) = map.next_entry::<String, Direction>()? {
            pairs.push((field, direction));
        }
        Ok(OrderByInput::Fields(pairs))
    }
}

// Maps keep their declaration order, which is the ordering priority.
impl<'de> Deserialize<'de> for OrderByInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderByInputVisitor)
    }
}
