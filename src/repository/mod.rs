//! Storage contracts for identities and tasks.
//!
//! Both implementations uphold the same relational rules: a task's owner must
//! exist, results are exclusively owned by one task, removing a result from a
//! task's collection deletes it, and deleting a task deletes its results. Every
//! write commits or rolls back as a whole.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::collections::HashSet;
use crate::errors::{StoreError, StoreResult};
use crate::models::{
    Epitope, EpitopeId, EpitopeTaskData, TaskId, TaskStatus, User, UserId,
};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts or updates by primary key, assigning ids to the task and to any
    /// new result records. Results missing from `task.epitopes` are deleted.
    async fn save(&self, task: EpitopeTaskData) -> StoreResult<EpitopeTaskData>;

    /// Same write as [`save`](Self::save), but only for a task that is
    /// already stored. The existence check and the write share one
    /// transaction, so a concurrent delete is never undone; a missing task
    /// yields `None` and nothing is written.
    async fn update(&self, task: EpitopeTaskData) -> StoreResult<Option<EpitopeTaskData>>;

    async fn find_all(&self) -> StoreResult<Vec<EpitopeTaskData>>;

    async fn find_by_id(&self, id: TaskId) -> StoreResult<Option<EpitopeTaskData>>;

    async fn find_tasks_by_user_id(&self, user_id: UserId) -> StoreResult<Vec<EpitopeTaskData>>;

    async fn find_by_user_id_and_status(
        &self,
        user_id: UserId,
        status: TaskStatus,
    ) -> StoreResult<Vec<EpitopeTaskData>>;

    /// Returns `false` without touching storage when no such task exists.
    async fn delete_by_id(&self, id: TaskId) -> StoreResult<bool>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts or updates by primary key. Usernames are unique.
    async fn save_user(&self, user: User) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Refuses to delete an identity that still owns tasks.
    async fn delete_user(&self, id: UserId) -> StoreResult<bool>;
}

/// Field-level checks every backend applies before a task write.
pub(crate) fn check_required_fields(task: &EpitopeTaskData) -> StoreResult<()> {
    if task.run_name.trim().is_empty() {
        return Err(StoreError::ConstraintViolation("run_name is required".into()));
    }
    Ok(())
}

pub(crate) fn check_owner_unchanged(
    stored: Option<&EpitopeTaskData>,
    task: &EpitopeTaskData,
) -> StoreResult<()> {
    match stored {
        Some(stored) if stored.user_id != task.user_id => {
            Err(StoreError::ConstraintViolation(format!(
                "task {:?} belongs to user {} and cannot move to user {}",
                task.id, stored.user_id, task.user_id
            )))
        }
        _ => Ok(()),
    }
}

/// Compares the stored result ids of a task with the collection being saved.
///
/// Returns the ids that were dropped from the collection. Results carrying an
/// id the task does not already own are rejected: they either belong to
/// another task or were already removed.
pub(crate) fn removed_epitopes(
    stored: &HashSet<EpitopeId>,
    incoming: &[Epitope],
) -> StoreResult<Vec<EpitopeId>> {
    let mut kept = HashSet::new();
    for id in incoming.iter().filter_map(|e| e.id) {
        if !stored.contains(&id) {
            return Err(StoreError::ConstraintViolation(format!(
                "epitope {} is not owned by this task",
                id
            )));
        }
        if !kept.insert(id) {
            return Err(StoreError::ConstraintViolation(format!(
                "epitope {} appears twice in the collection",
                id
            )));
        }
    }

    let mut removed: Vec<EpitopeId> = stored.difference(&kept).copied().collect();
    removed.sort_unstable();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epitope(id: Option<EpitopeId>) -> Epitope {
        Epitope {
            id,
            protein_id: "p1".into(),
            sequence: "KTAYIAKQ".into(),
            start: 2,
            end: 9,
            score: 0.7,
        }
    }

    #[test]
    fn dropped_results_are_reported_for_deletion() {
        let stored: HashSet<_> = [1, 2, 3].into_iter().collect();
        let removed = removed_epitopes(&stored, &[epitope(Some(2)), epitope(None)]).unwrap();
        assert_eq!(removed, vec![1, 3]);
    }

    #[test]
    fn foreign_result_ids_are_rejected() {
        let stored: HashSet<_> = [1].into_iter().collect();
        let err = removed_epitopes(&stored, &[epitope(Some(9))]).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[test]
    fn duplicated_result_ids_are_rejected() {
        let stored: HashSet<_> = [1].into_iter().collect();
        let err = removed_epitopes(&stored, &[epitope(Some(1)), epitope(Some(1))]).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }
}
