use tokio::time::Duration;
use std::sync::Arc;
use tokio::sync::Semaphore;
use crate::errors::{AppError, AppResult};
use crate::errors::worker::{WorkerError, WorkerResult};
use crate::models::{Epitope, EpitopeTaskData, FastaPayload, TaskStatus};
use crate::services::TaskService;
use super::pipeline::EpitopePipeline;
use super::queue::{JobReceiver, PipelineJob};

/// Drives queued tasks through the pipeline and writes the outcome back
/// through [`TaskService::update`], the same path any other caller uses.
#[derive(Clone)]
pub struct Worker {
    tasks: TaskService,
    pipeline: Arc<dyn EpitopePipeline>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl Worker {
    pub fn new(
        tasks: TaskService,
        pipeline: Arc<dyn EpitopePipeline>,
        semaphore: Arc<Semaphore>,
        timeout: Duration,
    ) -> Self {
        Self {
            tasks,
            pipeline,
            semaphore,
            timeout,
        }
    }

    /// Takes jobs until the queue is closed and drained.
    pub async fn run(self, jobs: JobReceiver) {
        tracing::info!("Worker started");

        loop {
            // The receiver lock is released before the job runs so other
            // workers can pick up the next one.
            let job = jobs.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };

            let _permit = match self.semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Failed to acquire semaphore: {}", e);
                    break;
                }
            };

            let task_id = job.task_id;
            if let Err(e) = self.process_job(job).await {
                tracing::error!("Failed to record outcome of task {}: {}", task_id, e);
            }
        }

        tracing::info!("Worker stopped: job queue closed");
    }

    /// Runs one job and returns the status it left the task in, or `None`
    /// when the task was deleted before the outcome could be recorded.
    pub async fn process_job(&self, job: PipelineJob) -> AppResult<Option<TaskStatus>> {
        let PipelineJob { task_id, fasta } = job;

        let Some(mut task) = self.tasks.find_by_id(task_id).await? else {
            tracing::warn!("Task {} vanished before processing", task_id);
            return Ok(None);
        };
        tracing::debug!("Processing task {} for user {}", task_id, task.user_id);

        task.status = TaskStatus::Processing;
        let task = match self.tasks.update(task).await {
            Ok(task) => task,
            Err(AppError::TaskNotFound(_)) => {
                tracing::warn!("Task {} was deleted before processing started", task_id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let outcome = self.run_with_timeout(task, fasta).await;

        // Re-read: the owner may have deleted the task while it ran.
        let Some(mut task) = self.tasks.find_by_id(task_id).await? else {
            tracing::warn!("Task {} was deleted while processing", task_id);
            return Ok(None);
        };

        match outcome {
            Ok(epitopes) => {
                tracing::info!("Task {} completed with {} epitope(s)", task_id, epitopes.len());
                task.epitopes.extend(epitopes);
                task.status = TaskStatus::Completed;
            }
            Err(e) => {
                tracing::error!("Task {} failed: {}", task_id, e);
                task.status = TaskStatus::Failed;
            }
        }

        let status = task.status;
        match self.tasks.update(task).await {
            Ok(_) => Ok(Some(status)),
            Err(AppError::TaskNotFound(_)) => {
                tracing::warn!("Task {} was deleted before its outcome was stored", task_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_with_timeout(
        &self,
        task: EpitopeTaskData,
        fasta: FastaPayload,
    ) -> WorkerResult<Vec<Epitope>> {
        let pipeline = self.pipeline.clone();
        let timeout = self.timeout;

        // Spawned so a panicking pipeline is caught as a JoinError; the
        // timeout lives inside so it also cancels the pipeline future.
        let handle = tokio::spawn(async move {
            tokio::time::timeout(timeout, pipeline.run(&task, &fasta)).await
        });

        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(WorkerError::Timeout(timeout)),
            Err(e) => Err(WorkerError::TaskPanic(e.to_string())),
        }
    }
}
