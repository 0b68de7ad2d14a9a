mod common;

use common::{store, user, User};
use recollect_data::{
    materialize, DataError, Limits, QueryDescriptor, QueryPageable, QueryRecollection, Value,
};

fn descriptor() -> QueryDescriptor {
    QueryDescriptor::for_entity::<User>("e", "id").unwrap()
}

fn recollection(rows: i64, limits: Limits) -> QueryRecollection<User, recollect_data::InMemoryStore<User>> {
    let pageable = QueryPageable::new(store(rows), descriptor()).unwrap();
    QueryRecollection::from_pageable(pageable, limits)
}

#[tokio::test]
async fn test_hard_limit() {
    let hard = Limits::new(None, Some(5)).unwrap();

    let err = recollection(6, hard).items().await.unwrap_err();
    assert!(
        matches!(err, DataError::ResultTooLarge { limit: 5, fetched: 6 }),
        "{err}"
    );

    let ok = recollection(5, hard);
    assert_eq!(ok.len().await.unwrap(), 5);
    assert!(!ok.over_soft_limit().await.unwrap());
}

#[tokio::test]
async fn test_soft_limit_truncates_and_flags() {
    let soft = recollection(6, Limits::new(Some(5), None).unwrap());
    let loaded = soft.materialized().await.unwrap();
    assert_eq!(loaded.items.len(), 5);
    assert!(loaded.over_soft_limit);
    assert_eq!(soft.last().await.unwrap().map(|u| u.id), Some(5));
}

#[tokio::test]
async fn test_soft_and_hard_limits() {
    let both = recollection(6, Limits::new(Some(5), Some(10)).unwrap());
    assert_eq!(both.len().await.unwrap(), 6);
    assert!(both.over_soft_limit().await.unwrap());

    let err = recollection(11, Limits::new(Some(5), Some(10)).unwrap())
        .items()
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::ResultTooLarge { limit: 10, fetched: 11 }));
}

#[tokio::test]
async fn test_materialize_fetches_limit_plus_one() {
    let store = store(50);
    let result = materialize::<User, _>(store.as_ref(), &descriptor(), Limits::new(None, Some(5)).unwrap()).await;
    assert!(result.is_err());
    assert_eq!(store.stats().fetches, 1);
}

#[tokio::test]
async fn test_materialization_runs_once() {
    let store = store(6);
    let rec = QueryRecollection::new(store.clone(), descriptor()).unwrap();

    assert!(!rec.is_empty().await.unwrap());
    assert_eq!(rec.keys().await.unwrap(), (1..=6i64).map(Value::from).collect::<Vec<_>>());
    assert_eq!(rec.first().await.unwrap(), Some(user(1)));
    assert_eq!(rec.get_loaded(4i64).await.unwrap(), Some(user(4)));
    assert_eq!(rec.get_loaded(40i64).await.unwrap(), None);
    assert_eq!(store.stats().fetches, 1);
}

#[tokio::test]
async fn test_collection_helpers() {
    let rec = recollection(6, Limits::unbounded());

    assert!(rec.exists(|_, u| u.age == 12).await.unwrap());
    assert!(rec.for_all(|_, u| u.age % 2 == 0).await.unwrap());
    assert_eq!(
        rec.find_first(|_, u| u.team.is_some()).await.unwrap().map(|u| u.id),
        Some(2)
    );
    assert_eq!(rec.reduce(0, |acc, u| acc + u.age).await.unwrap(), 42);
    assert_eq!(rec.index_of(&user(3)).await.unwrap(), Some(Value::Int(3)));

    let evens = rec.filter(|_, u| u.id % 2 == 0).await.unwrap();
    assert_eq!(evens.keys().cloned().collect::<Vec<_>>(), vec![Value::Int(2), Value::Int(4), Value::Int(6)]);

    let (small, big) = rec.partition(|k, _| k < &Value::Int(3)).await.unwrap();
    assert_eq!((small.len(), big.len()), (2, 4));

    let names = rec.map(|u| u.name.clone()).await.unwrap();
    assert_eq!(names.get(&Value::Int(6)), Some(&"user1".to_string()));

    let middle = rec.slice(2, Some(2)).await.unwrap();
    assert_eq!(middle.keys().cloned().collect::<Vec<_>>(), vec![Value::Int(3), Value::Int(4)]);

    let pairs = rec.to_vec().await.unwrap();
    assert_eq!(pairs[0], (Value::Int(1), user(1)));
    assert_eq!(rec.values().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_derived_recollection_reloads() {
    let store = store(6);
    let rec = QueryRecollection::new(store.clone(), descriptor()).unwrap();
    assert_eq!(rec.len().await.unwrap(), 6);

    let old = rec.update_query(|q| *q = q.clone().where_le("id", 3)).unwrap();
    assert_eq!(old.len().await.unwrap(), 3);
    assert_eq!(rec.len().await.unwrap(), 6);
    assert_eq!(store.stats().fetches, 2);
}

/// Accepts keys as decimal strings, as they arrive from URLs.
fn parse_key(key: Value) -> Result<Value, DataError> {
    match key {
        Value::Text(text) => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| DataError::InvalidArgument(format!("invalid key {text:?}: {e}"))),
        other => Ok(other),
    }
}

#[tokio::test]
async fn test_key_transformer_applies_to_loaded_lookups() {
    let plain = recollection(6, Limits::unbounded());
    assert_eq!(plain.get_loaded("4").await.unwrap(), None);

    let rec = plain.with_key_transformer(parse_key);
    assert_eq!(rec.get_loaded("4").await.unwrap(), Some(user(4)));
    assert_eq!(rec.get_loaded(5).await.unwrap(), Some(user(5)));
    assert_eq!(rec.get_loaded("40").await.unwrap(), None);
    let err = rec.get_loaded("four").await.unwrap_err();
    assert!(matches!(err, DataError::InvalidArgument(_)), "{err}");

    // Derived recollections keep the transformer.
    let small = rec.update_query(|q| *q = q.clone().where_le("id", 3)).unwrap();
    assert_eq!(small.get_loaded("2").await.unwrap(), Some(user(2)));
    assert_eq!(small.get_loaded("4").await.unwrap(), None);
}
