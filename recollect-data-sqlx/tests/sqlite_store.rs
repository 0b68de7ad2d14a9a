use recollect_data_sqlx::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct Article {
    id: i64,
    title: String,
    author: Option<String>,
}

impl Entity for Article {
    type Key = i64;

    fn entity_name() -> &'static str {
        "articles"
    }

    fn key_columns() -> &'static [&'static str] {
        &["id"]
    }

    fn columns() -> &'static [&'static str] {
        &["id", "title", "author"]
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn value(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(self.id.into()),
            "title" => Some(self.title.as_str().into()),
            "author" => Some(self.author.clone().into()),
            _ => None,
        }
    }
}

fn article(id: i64) -> Article {
    Article {
        id,
        title: format!("{} article {id}", if id % 3 == 0 { "Rust" } else { "Misc" }),
        author: (id % 2 == 1).then(|| "alice".to_string()),
    }
}

async fn setup(rows: i64) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("CREATE TABLE articles (id INTEGER PRIMARY KEY, title TEXT NOT NULL, author TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    for id in 1..=rows {
        let a = article(id);
        sqlx::query("INSERT INTO articles (id, title, author) VALUES (?, ?, ?)")
            .bind(a.id)
            .bind(a.title)
            .bind(a.author)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool
}

fn ids(page: &Page<Article>) -> Vec<i64> {
    page.items().values().map(|a| a.id).collect()
}

#[tokio::test]
async fn test_keyset_pages_against_sqlite() {
    let store = Arc::new(SqliteStore::<Article>::new(setup(12).await));
    let config = RepositoryConfig::new()
        .with_items_per_page(5)
        .with_count(CountStrategyKind::Delegate);
    let repo = Repository::<Article, _>::with_config(store, config).unwrap();

    assert_eq!(repo.count().await.unwrap(), 12);
    assert_eq!(repo.page_count().await.unwrap(), Some(3));

    let first = repo.first_page().await.unwrap();
    assert_eq!(ids(&first), vec![1, 2, 3, 4, 5]);
    let second = repo.next_page(&first).await.unwrap().unwrap();
    assert_eq!(ids(&second), vec![6, 7, 8, 9, 10]);
    let third = repo.next_page(&second).await.unwrap().unwrap();
    assert_eq!(ids(&third), vec![11, 12]);
    assert!(!third.has_next());

    let back = repo.previous_page(&third).await.unwrap().unwrap();
    assert_eq!(ids(&back), vec![6, 7, 8, 9, 10]);
}

/// Ids of every page, following next identifiers from the first.
async fn walk(repo: &Repository<Article, SqliteStore<Article>>) -> Vec<Vec<i64>> {
    let mut out = Vec::new();
    let mut pages = repo.pages();
    while let Some(page) = pages.next_page().await.unwrap() {
        out.push(ids(&page));
    }
    out
}

#[tokio::test]
async fn test_keyset_over_nullable_column_against_sqlite() {
    let store = Arc::new(SqliteStore::<Article>::new(setup(12).await));
    let ascending = Repository::<Article, _>::with_config(
        store.clone(),
        RepositoryConfig::new().with_order_by("author").with_items_per_page(5),
    )
    .unwrap();
    // Even ids have no author and sort first.
    assert_eq!(
        walk(&ascending).await,
        vec![vec![2, 4, 6, 8, 10], vec![12, 1, 3, 5, 7], vec![9, 11]]
    );

    let first = ascending.first_page().await.unwrap();
    let second = ascending.next_page(&first).await.unwrap().unwrap();
    let third = ascending.next_page(&second).await.unwrap().unwrap();
    let back = ascending.previous_page(&third).await.unwrap().unwrap();
    assert_eq!(ids(&back), vec![12, 1, 3, 5, 7]);

    let descending = Repository::<Article, _>::with_config(
        store,
        RepositoryConfig::new()
            .with_order_by(vec![("author", Direction::Desc)])
            .with_items_per_page(5),
    )
    .unwrap();
    assert_eq!(
        walk(&descending).await,
        vec![vec![1, 3, 5, 7, 9], vec![11, 2, 4, 6, 8], vec![10, 12]]
    );
}

#[tokio::test]
async fn test_offset_pages_with_descending_order() {
    let store = Arc::new(SqliteStore::<Article>::new(setup(7).await));
    let config = RepositoryConfig::new()
        .with_items_per_page(3)
        .with_pagination(Pagination::Offset)
        .with_order_by(vec![("author", Direction::Desc), ("id", Direction::Asc)]);
    let repo = Repository::<Article, _>::with_config(store, config).unwrap();

    let first = repo.first_page().await.unwrap();
    assert_eq!(first.number(), Some(1));
    // SQLite sorts NULL first ascending, so last descending.
    assert_eq!(ids(&first), vec![1, 3, 5]);

    let page = repo.page(&PageIdentifier::Offset { number: 3 }).await.unwrap();
    assert_eq!(ids(&page), vec![6]);
    assert!(repo.count().await.unwrap_err().is_count_unsupported());
}

#[tokio::test]
async fn test_matching_translates_criteria() {
    let store = Arc::new(SqliteStore::<Article>::new(setup(9).await));
    let repo = Repository::<Article, _>::with_config(
        store,
        RepositoryConfig::new().with_count(CountStrategyKind::Delegate),
    )
    .unwrap();

    let rust = repo
        .matching(&Criteria::new().like("title", "rust%").is_not_null("author"))
        .unwrap();
    assert_eq!(rust.count().await.unwrap(), 2);
    assert_eq!(
        rust.values().await.unwrap().into_iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![3, 9]
    );

    let err = repo.matching(&Criteria::new().order_by("rating", Direction::Desc)).unwrap_err();
    assert!(matches!(err, DataError::Configuration(_)), "{err}");
}

#[tokio::test]
async fn test_staged_writes_flush_in_one_transaction() {
    let pool = setup(3).await;
    let store = Arc::new(SqliteStore::<Article>::new(pool.clone()));
    let repo = Repository::<Article, _>::new(store.clone()).unwrap();

    assert_eq!(repo.get_or_fail(&2).await.unwrap(), article(2));
    assert!(repo.get_or_fail(&40).await.unwrap_err().is_not_found());

    repo.add(article(4)).await.unwrap();
    assert!(repo.remove(&1).await.unwrap().is_some());
    assert_eq!(store.staged_len(), 2);
    assert_eq!(repo.get(&4).await.unwrap(), None);

    store.flush().await.unwrap();
    assert_eq!(store.staged_len(), 0);

    let remaining: Vec<i64> = sqlx::query_scalar("SELECT id FROM articles ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, vec![2, 3, 4]);

    let mut renamed = article(2);
    renamed.title = "renamed".into();
    repo.add(renamed.clone()).await.unwrap();
    store.clear();
    assert_eq!(store.staged_len(), 0);
    store.flush().await.unwrap();
    assert_eq!(repo.get(&2).await.unwrap(), Some(article(2)));
}

#[tokio::test]
async fn test_failed_flush_keeps_writes_staged() {
    let pool = setup(1).await;
    let store = Arc::new(SqliteStore::<Article>::new(pool.clone()));
    let repo = Repository::<Article, _>::new(store.clone()).unwrap();

    sqlx::query("DROP TABLE articles").execute(&pool).await.unwrap();
    repo.add(article(5)).await.unwrap();

    let err = store.flush().await.unwrap_err();
    assert!(matches!(err, DataError::Database(_)), "{err}");
    assert_eq!(store.staged_len(), 1);
}
