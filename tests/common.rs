#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use epibuilder::models::{
    ActionType, Epitope, EpitopeTaskData, Role, TaskStatus, User, UserId,
};
use epibuilder::repository::{RedisStore, UserRepository};

/// Store used by the Redis runs of the shared checks. The server is shared
/// between runs and never flushed, so checks only look at data they created.
pub fn redis_store() -> RedisStore {
    let url = std::env::var("APP__STORAGE__URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(url).expect("valid redis url");
    RedisStore::new(Arc::new(client), 5)
}

/// Username that no other run or check has used.
pub fn unique_name(base: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}-{}", base, nanos, COUNTER.fetch_add(1, Ordering::Relaxed))
}

pub fn user(username: &str, role: Role) -> User {
    User {
        id: None,
        name: username.to_uppercase(),
        username: username.to_string(),
        password_hash: "$2b$04$not-a-real-hash".to_string(),
        role,
    }
}

pub async fn identity<S: UserRepository>(store: &S, username: &str, role: Role) -> UserId {
    store
        .save_user(user(&unique_name(username), role))
        .await
        .expect("identity should save")
        .id
        .expect("saved identity has an id")
}

pub fn task_for(user_id: UserId) -> EpitopeTaskData {
    EpitopeTaskData {
        id: None,
        task_name: Some("spike".to_string()),
        execution_date: None,
        user_id,
        run_name: "run-1".to_string(),
        action: ActionType::Predict,
        bepipred_min: 0.5,
        bepipred_max: 0.9,
        min_epitope_length: 8,
        max_epitope_length: 20,
        subcell: "Secreted".to_string(),
        interpro: "IPR000001".to_string(),
        epitope_search: String::new(),
        status: TaskStatus::Queued,
        epitopes: Vec::new(),
    }
}

pub fn epitope(sequence: &str, start: u32) -> Epitope {
    Epitope {
        id: None,
        protein_id: "sp|P0DTC2".to_string(),
        sequence: sequence.to_string(),
        start,
        end: start + sequence.len() as u32 - 1,
        score: 0.75,
    }
}
