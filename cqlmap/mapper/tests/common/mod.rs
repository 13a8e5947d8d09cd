//! Shared fixtures for the mapper integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use cqlmap_mapper::config::LoggingConfig;
use cqlmap_mapper::{entity, logging, MemoryStore, SessionProvider};
use std::sync::Arc;

entity! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Account {
        pub id: String => "primary_key",
        pub display_name: String => "json:displayName",
        pub email: Option<String>,
        pub created_at: Option<DateTime<Utc>> => "update:false;json:createdAt",
        pub avatar: Vec<u8>,
        pub version: i64 => "version",
        pub session_token: String => "ignore",
    }
}

entity! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Membership {
        pub org: String => "primary_key;column:org_id",
        pub user: String => "primary_key;column:user_id",
        pub role: String,
    }
}

pub fn account(id: &str, name: &str) -> Account {
    Account {
        id: id.to_string(),
        display_name: name.to_string(),
        ..Account::default()
    }
}

/// Store with `accounts` and `memberships` tables
pub fn store() -> (MemoryStore, Arc<dyn SessionProvider>) {
    logging::init_tracing(&LoggingConfig {
        level: "warn".to_string(),
        ..LoggingConfig::default()
    });
    let store = MemoryStore::new();
    store.create_table("accounts", &["id"]);
    store.create_table("memberships", &["org_id", "user_id"]);
    let provider: Arc<dyn SessionProvider> = Arc::new(store.clone());
    (store, provider)
}
