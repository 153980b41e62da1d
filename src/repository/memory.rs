use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use super::{check_owner_unchanged, check_required_fields, removed_epitopes};
use super::{TaskRepository, UserRepository};
use crate::errors::{StoreError, StoreResult};
use crate::models::{
    Epitope, EpitopeId, EpitopeTaskData, TaskId, TaskStatus, User, UserId,
};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    // Task rows without results; results live in `epitopes` keyed by owner.
    tasks: BTreeMap<TaskId, EpitopeTaskData>,
    epitopes: HashMap<TaskId, BTreeMap<EpitopeId, Epitope>>,
    next_user_id: UserId,
    next_task_id: TaskId,
    next_epitope_id: EpitopeId,
}

impl State {
    fn assemble(&self, row: &EpitopeTaskData) -> EpitopeTaskData {
        let mut task = row.clone();
        task.epitopes = row
            .id
            .and_then(|id| self.epitopes.get(&id))
            .map(|results| results.values().cloned().collect())
            .unwrap_or_default();
        task
    }

    fn tasks_of(&self, user_id: UserId) -> impl Iterator<Item = &EpitopeTaskData> {
        self.tasks.values().filter(move |t| t.user_id == user_id)
    }
}

/// In-process store with the same relational rules as [`super::RedisStore`].
///
/// A write holds the lock for its whole duration and validates everything
/// before mutating, so a rejected write leaves no trace.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared body of `save` and `update`. With `existing_only`, a task that
    /// is not stored yields `None` and nothing is written.
    async fn write_task(
        &self,
        mut task: EpitopeTaskData,
        existing_only: bool,
    ) -> StoreResult<Option<EpitopeTaskData>> {
        check_required_fields(&task)?;
        let mut state = self.state.write().await;

        if existing_only && !task.id.is_some_and(|id| state.tasks.contains_key(&id)) {
            return Ok(None);
        }
        if !state.users.contains_key(&task.user_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "owner {} does not exist",
                task.user_id
            )));
        }
        check_owner_unchanged(task.id.and_then(|id| state.tasks.get(&id)), &task)?;

        let stored: HashSet<EpitopeId> = task
            .id
            .and_then(|id| state.epitopes.get(&id))
            .map(|results| results.keys().copied().collect())
            .unwrap_or_default();
        // Only the ownership check matters here; the rebuilt map below drops
        // whatever the collection no longer lists.
        removed_epitopes(&stored, &task.epitopes)?;

        let id = match task.id {
            Some(id) => id,
            None => {
                state.next_task_id += 1;
                state.next_task_id
            }
        };
        state.next_task_id = state.next_task_id.max(id);
        task.id = Some(id);

        let mut results = BTreeMap::new();
        for mut epitope in std::mem::take(&mut task.epitopes) {
            let epitope_id = match epitope.id {
                Some(eid) => eid,
                None => {
                    state.next_epitope_id += 1;
                    state.next_epitope_id
                }
            };
            epitope.id = Some(epitope_id);
            results.insert(epitope_id, epitope);
        }

        state.tasks.insert(id, task.clone());
        state.epitopes.insert(id, results);
        Ok(Some(state.assemble(&task)))
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn save(&self, task: EpitopeTaskData) -> StoreResult<EpitopeTaskData> {
        let task_id = task.id;
        let saved = self.write_task(task, false).await?;
        saved.ok_or_else(|| StoreError::ConstraintViolation(format!("task {:?} was not written", task_id)))
    }

    async fn update(&self, task: EpitopeTaskData) -> StoreResult<Option<EpitopeTaskData>> {
        self.write_task(task, true).await
    }

    async fn find_all(&self) -> StoreResult<Vec<EpitopeTaskData>> {
        let state = self.state.read().await;
        Ok(state.tasks.values().map(|row| state.assemble(row)).collect())
    }

    async fn find_by_id(&self, id: TaskId) -> StoreResult<Option<EpitopeTaskData>> {
        let state = self.state.read().await;
        Ok(state.tasks.get(&id).map(|row| state.assemble(row)))
    }

    async fn find_tasks_by_user_id(&self, user_id: UserId) -> StoreResult<Vec<EpitopeTaskData>> {
        let state = self.state.read().await;
        Ok(state.tasks_of(user_id).map(|row| state.assemble(row)).collect())
    }

    async fn find_by_user_id_and_status(
        &self,
        user_id: UserId,
        status: TaskStatus,
    ) -> StoreResult<Vec<EpitopeTaskData>> {
        let state = self.state.read().await;
        Ok(state
            .tasks_of(user_id)
            .filter(|row| row.status == status)
            .map(|row| state.assemble(row))
            .collect())
    }

    async fn delete_by_id(&self, id: TaskId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.tasks.remove(&id).is_none() {
            return Ok(false);
        }
        state.epitopes.remove(&id);
        Ok(true)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn save_user(&self, mut user: User) -> StoreResult<User> {
        let mut state = self.state.write().await;

        if let Some(&owner) = state.usernames.get(&user.username) {
            if Some(owner) != user.id {
                return Err(StoreError::ConstraintViolation(format!(
                    "username {} is already taken",
                    user.username
                )));
            }
        }

        let id = match user.id {
            Some(id) => id,
            None => {
                state.next_user_id += 1;
                state.next_user_id
            }
        };
        state.next_user_id = state.next_user_id.max(id);
        user.id = Some(id);

        if let Some(previous) = state.users.get(&id).map(|u| u.username.clone()) {
            state.usernames.remove(&previous);
        }
        state.usernames.insert(user.username.clone(), id);
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .usernames
            .get(username)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Ok(false);
        }
        if state.tasks_of(id).next().is_some() {
            return Err(StoreError::ConstraintViolation(format!(
                "user {} still owns tasks",
                id
            )));
        }
        if let Some(user) = state.users.remove(&id) {
            state.usernames.remove(&user.username);
        }
        Ok(true)
    }
}
