use std::sync::Arc;
use crate::errors::{AppError, AppResult};
use crate::models::{EpitopeTaskData, TaskId, TaskStatus, UserId};
use crate::repository::TaskRepository;

/// Stable call surface over a [`TaskRepository`].
///
/// Adds logging on the successful query paths and nothing else: storage
/// errors reach the caller unchanged and nothing is retried here. Each call
/// maps to exactly one repository operation, which is one transaction.
#[derive(Clone)]
pub struct TaskService {
    repository: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repository: Arc<dyn TaskRepository>) -> Self {
        Self { repository }
    }

    pub async fn save(&self, task: EpitopeTaskData) -> AppResult<EpitopeTaskData> {
        let saved = self.repository.save(task).await?;
        tracing::debug!("Saved task {:?} for user {}", saved.id, saved.user_id);
        Ok(saved)
    }

    /// Like [`save`](Self::save), but only for a task that already exists.
    ///
    /// The existence check happens inside the storage write, so a task deleted
    /// concurrently stays deleted and the caller gets `TaskNotFound`.
    pub async fn update(&self, task: EpitopeTaskData) -> AppResult<EpitopeTaskData> {
        let id = task
            .id
            .ok_or_else(|| AppError::Validation("cannot update a task without an id".into()))?;
        self.repository
            .update(task)
            .await?
            .ok_or(AppError::TaskNotFound(id))
    }

    pub async fn find_all(&self) -> AppResult<Vec<EpitopeTaskData>> {
        let tasks = self.repository.find_all().await?;
        tracing::info!("Number of tasks found: {}", tasks.len());
        Ok(tasks)
    }

    pub async fn find_by_id(&self, id: TaskId) -> AppResult<Option<EpitopeTaskData>> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_by_user_id_and_status(
        &self,
        user_id: UserId,
        status: TaskStatus,
    ) -> AppResult<Vec<EpitopeTaskData>> {
        let tasks = self
            .repository
            .find_by_user_id_and_status(user_id, status)
            .await?;
        tracing::info!("Found {} {} task(s) for user ID: {}", tasks.len(), status, user_id);
        Ok(tasks)
    }

    pub async fn delete_by_id(&self, id: TaskId) -> AppResult<bool> {
        let deleted = self.repository.delete_by_id(id).await?;
        tracing::info!("Delete of task {} {}", id, if deleted { "succeeded" } else { "found nothing" });
        Ok(deleted)
    }

    pub async fn find_tasks_by_user_id(&self, user_id: UserId) -> AppResult<Vec<EpitopeTaskData>> {
        tracing::info!("Fetching tasks for user ID: {}", user_id);
        let tasks = self.repository.find_tasks_by_user_id(user_id).await?;

        tracing::info!("Number of tasks found: {}", tasks.len());
        for task in &tasks {
            tracing::info!("Task ID: {:?}, User ID: {}", task.id, task.user_id);
        }

        Ok(tasks)
    }
}
