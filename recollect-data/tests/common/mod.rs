#![allow(dead_code)]

use recollect_data::{Entity, InMemoryStore, Value};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub team: Option<String>,
}

impl Entity for User {
    type Key = i64;

    fn entity_name() -> &'static str {
        "users"
    }

    fn key_columns() -> &'static [&'static str] {
        &["id"]
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name", "age", "team"]
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn value(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "age" => Some(self.age.into()),
            "team" => Some(self.team.clone().into()),
            _ => None,
        }
    }
}

/// `user{id % 5}` names so that orderings by name have ties; ages are `2 * id`.
pub fn user(id: i64) -> User {
    User {
        id,
        name: format!("user{}", id % 5),
        age: id * 2,
        team: (id % 2 == 0).then(|| "even".to_string()),
    }
}

pub fn users(n: i64) -> Vec<User> {
    (1..=n).map(user).collect()
}

pub fn store(n: i64) -> Arc<InMemoryStore<User>> {
    init_tracing();
    Arc::new(InMemoryStore::with_rows(users(n)))
}

/// Entity with a two-column key.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub team_id: i64,
    pub user_id: i64,
}

impl Entity for Membership {
    type Key = String;

    fn entity_name() -> &'static str {
        "memberships"
    }

    fn key_columns() -> &'static [&'static str] {
        &["team_id", "user_id"]
    }

    fn columns() -> &'static [&'static str] {
        &["team_id", "user_id"]
    }

    fn key(&self) -> String {
        format!("{}:{}", self.team_id, self.user_id)
    }

    fn value(&self, column: &str) -> Option<Value> {
        match column {
            "team_id" => Some(self.team_id.into()),
            "user_id" => Some(self.user_id.into()),
            _ => None,
        }
    }
}
