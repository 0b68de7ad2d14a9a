use crate::error::SqlxErrorExt;
use dashmap::DashSet;
use recollect_data::query::{quote_checked, Dialect, IdentifierPolicy, QueryBuilder};
use recollect_data::{
    BoxFuture, DataError, DatabaseSession, Entity, EntityStore, QueryDescriptor, RowCounter, Value,
};
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Arguments, FromRow};
use std::marker::PhantomData;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum StagedWrite<E> {
    Upsert(E),
    Delete(Value),
}

/// An [`EntityStore`] over a SQLite pool.
///
/// Reads go straight to the pool. `persist` and `remove` are staged and
/// applied by [`DatabaseSession::flush`] inside one transaction; a failed
/// flush rolls back and keeps the writes staged.
///
/// # Example
///
/// ```ignore
/// let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await?;
/// let store = Arc::new(SqliteStore::<UserEntity>::new(pool));
/// let users = Repository::with_config(store.clone(), config)?;
/// users.add(user).await?;
/// store.flush().await?;
/// ```
pub struct SqliteStore<E> {
    pool: SqlitePool,
    managed: DashSet<Value>,
    staged: Mutex<Vec<StagedWrite<E>>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> SqliteStore<E>
where
    E: Entity + for<'r> FromRow<'r, SqliteRow>,
{
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            managed: DashSet::new(),
            staged: Mutex::new(Vec::new()),
            _entity: PhantomData,
        }
    }

    /// Get the underlying pool reference.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn staged_len(&self) -> usize {
        self.staged.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn stage(&self, write: StagedWrite<E>) -> Result<(), DataError> {
        self.staged
            .lock()
            .map_err(|_| DataError::Other("staged write queue poisoned".into()))?
            .push(write);
        Ok(())
    }

    fn take_staged(&self) -> Result<Vec<StagedWrite<E>>, DataError> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| DataError::Other("staged write queue poisoned".into()))?;
        Ok(std::mem::take(&mut *staged))
    }

    /// Put writes back in front of anything staged since they were taken.
    fn restage(&self, mut writes: Vec<StagedWrite<E>>) {
        if let Ok(mut staged) = self.staged.lock() {
            writes.append(&mut staged);
            *staged = writes;
        }
    }

    async fn apply(&self, writes: &[StagedWrite<E>]) -> Result<(), DataError> {
        let mut tx = self.pool.begin().await.map_err(|e| e.into_data_error())?;
        for write in writes {
            let (sql, values) = match write {
                StagedWrite::Upsert(entity) => upsert_statement(entity)?,
                StagedWrite::Delete(key) => delete_statement::<E>(key.clone())?,
            };
            tracing::debug!(entity = E::entity_name(), %sql, "applying staged write");
            sqlx::query_with(&sql, arguments(values)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.into_data_error())?;
        }
        tx.commit().await.map_err(|e| e.into_data_error())
    }
}

impl<E> RowCounter for SqliteStore<E>
where
    E: Entity + for<'r> FromRow<'r, SqliteRow>,
{
    fn count<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, Result<u64, DataError>> {
        Box::pin(async move {
            let (sql, params) = sqlite(query.count_query()).build_count_checked()?;
            tracing::debug!(entity = query.entity(), %sql, "count query");
            let count: i64 = sqlx::query_scalar_with(&sql, arguments(params)?)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.into_data_error())?;
            Ok(count.max(0) as u64)
        })
    }
}

impl<E> EntityStore<E> for SqliteStore<E>
where
    E: Entity + for<'r> FromRow<'r, SqliteRow>,
{
    fn fetch<'a>(&'a self, query: &'a QueryDescriptor) -> BoxFuture<'a, Result<Vec<E>, DataError>> {
        Box::pin(async move {
            let (sql, params) = sqlite(query.builder().clone()).build_select_checked(E::columns())?;
            tracing::debug!(entity = query.entity(), %sql, "select query");
            let rows: Vec<E> = sqlx::query_as_with(&sql, arguments(params)?)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| e.into_data_error())?;
            for row in &rows {
                self.managed.insert(row.key().into());
            }
            Ok(rows)
        })
    }

    fn find<'a>(&'a self, key: &'a E::Key) -> BoxFuture<'a, Result<Option<E>, DataError>> {
        Box::pin(async move {
            let column = key_column::<E>()?;
            let (sql, params) = sqlite(QueryBuilder::new(E::entity_name()).where_eq(column, key.clone()).limit(1))
                .build_select_checked(E::columns())?;
            let row: Option<E> = sqlx::query_as_with(&sql, arguments(params)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| e.into_data_error())?;
            if let Some(row) = &row {
                self.managed.insert(row.key().into());
            }
            Ok(row)
        })
    }

    fn persist(&self, entity: E) -> BoxFuture<'_, Result<(), DataError>> {
        Box::pin(async move {
            self.managed.insert(entity.key().into());
            self.stage(StagedWrite::Upsert(entity))
        })
    }

    fn remove<'a>(&'a self, entity: &'a E) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(async move {
            let key: Value = entity.key().into();
            self.managed.remove(&key);
            self.stage(StagedWrite::Delete(key))
        })
    }

    fn contains(&self, entity: &E) -> bool {
        let key: Value = entity.key().into();
        self.managed.contains(&key)
    }
}

impl<E> DatabaseSession for SqliteStore<E>
where
    E: Entity + for<'r> FromRow<'r, SqliteRow>,
{
    fn flush(&self) -> BoxFuture<'_, Result<(), DataError>> {
        Box::pin(async move {
            let writes = self.take_staged()?;
            if writes.is_empty() {
                return Ok(());
            }
            match self.apply(&writes).await {
                Ok(()) => {
                    tracing::info!(entity = E::entity_name(), applied = writes.len(), "flushed staged writes");
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!(entity = E::entity_name(), error = %err, "flush rolled back");
                    self.restage(writes);
                    Err(err)
                }
            }
        })
    }

    fn clear(&self) {
        if let Ok(mut staged) = self.staged.lock() {
            staged.clear();
        }
        self.managed.clear();
    }
}

fn sqlite(builder: QueryBuilder) -> QueryBuilder {
    builder
        .dialect(Dialect::Sqlite)
        .identifier_policy(IdentifierPolicy::Quote)
}

fn key_column<E: Entity>() -> Result<&'static str, DataError> {
    match E::key_columns() {
        [column] => Ok(column),
        _ => Err(DataError::Configuration(format!(
            "entity '{}' must have exactly one key column",
            E::entity_name()
        ))),
    }
}

fn upsert_statement<E: Entity>(entity: &E) -> Result<(String, Vec<Value>), DataError> {
    let table = quote_checked(E::entity_name(), Dialect::Sqlite, "table")?;
    let mut columns = Vec::with_capacity(E::columns().len());
    let mut values = Vec::with_capacity(E::columns().len());
    for column in E::columns() {
        columns.push(quote_checked(column, Dialect::Sqlite, "column")?);
        values.push(entity.value(column).unwrap_or(Value::Null));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    Ok((sql, values))
}

fn delete_statement<E: Entity>(key: Value) -> Result<(String, Vec<Value>), DataError> {
    let table = quote_checked(E::entity_name(), Dialect::Sqlite, "table")?;
    let column = quote_checked(key_column::<E>()?, Dialect::Sqlite, "column")?;
    Ok((format!("DELETE FROM {table} WHERE {column} = ?"), vec![key]))
}

fn arguments<'q>(values: Vec<Value>) -> Result<SqliteArguments<'q>, DataError> {
    let mut args = SqliteArguments::default();
    for value in values {
        let added = match value {
            Value::Null => args.add(Option::<i64>::None),
            Value::Bool(b) => args.add(b),
            Value::Int(i) => args.add(i),
            Value::Text(s) => args.add(s),
        };
        added.map_err(DataError::Database)?;
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Note {
        id: i64,
        body: String,
    }

    impl Entity for Note {
        type Key = i64;
        fn entity_name() -> &'static str {
            "notes"
        }
        fn key_columns() -> &'static [&'static str] {
            &["id"]
        }
        fn columns() -> &'static [&'static str] {
            &["id", "body"]
        }
        fn key(&self) -> i64 {
            self.id
        }
        fn value(&self, column: &str) -> Option<Value> {
            match column {
                "id" => Some(self.id.into()),
                "body" => Some(self.body.as_str().into()),
                _ => None,
            }
        }
    }

    #[test]
    fn test_upsert_statement() {
        let (sql, values) = upsert_statement(&Note {
            id: 3,
            body: "hi".into(),
        })
        .unwrap();
        assert_eq!(sql, "INSERT OR REPLACE INTO \"notes\" (\"id\", \"body\") VALUES (?, ?)");
        assert_eq!(values, vec![Value::Int(3), Value::from("hi")]);
    }

    #[test]
    fn test_delete_statement() {
        let (sql, values) = delete_statement::<Note>(Value::Int(3)).unwrap();
        assert_eq!(sql, "DELETE FROM \"notes\" WHERE \"id\" = ?");
        assert_eq!(values, vec![Value::Int(3)]);
    }
}
