use crate::value::Value;
use std::fmt::Debug;

/// Trait representing a persisted entity with a table name, key column, and column list.
///
/// Intended to be implemented manually or via a derive macro.
///
/// # Example
///
/// ```ignore
/// impl Entity for UserEntity {
///     type Key = i64;
///     fn entity_name() -> &'static str { "users" }
///     fn key_columns() -> &'static [&'static str] { &["id"] }
///     fn columns() -> &'static [&'static str] { &["id", "name", "email"] }
///     fn key(&self) -> i64 { self.id }
///     fn value(&self, column: &str) -> Option<Value> {
///         match column {
///             "id" => Some(self.id.into()),
///             "name" => Some(self.name.as_str().into()),
///             "email" => Some(self.email.as_str().into()),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Entity: Clone + Send + Sync + Unpin + 'static {
    type Key: Clone + Debug + Into<Value> + Send + Sync + 'static;

    fn entity_name() -> &'static str;

    /// Columns forming the primary key. Only single-column keys are supported;
    /// repositories and pageables reject anything else at construction.
    fn key_columns() -> &'static [&'static str];

    fn columns() -> &'static [&'static str];

    fn key(&self) -> Self::Key;

    /// Value of `column` for this entity, or `None` if the column is unknown.
    fn value(&self, column: &str) -> Option<Value>;
}

/// Name of the single key column of `E`, or a configuration error for
/// composite or missing keys.
pub(crate) fn single_key_column<E: Entity>() -> Result<&'static str, crate::DataError> {
    match E::key_columns() {
        [column] => Ok(column),
        [] => Err(crate::DataError::configuration(format!(
            "entity '{}' declares no key column",
            E::entity_name()
        ))),
        columns => Err(crate::DataError::configuration(format!(
            "entity '{}' has a composite key ({}); only single-column keys are supported",
            E::entity_name(),
            columns.join(", ")
        ))),
    }
}

pub(crate) fn ensure_column<E: Entity>(column: &str, role: &str) -> Result<(), crate::DataError> {
    if E::columns().contains(&column) {
        Ok(())
    } else {
        Err(crate::DataError::configuration(format!(
            "{role} '{column}' is not a column of '{}'",
            E::entity_name()
        )))
    }
}
