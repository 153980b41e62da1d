use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use crate::errors::worker::{WorkerError, WorkerResult};
use crate::models::{FastaPayload, TaskId};

/// A persisted task waiting for the pipeline, together with its upload.
#[derive(Debug)]
pub struct PipelineJob {
    pub task_id: TaskId,
    pub fasta: FastaPayload,
}

// Shared by every worker; whoever holds the lock takes the next job.
pub type JobReceiver = Arc<Mutex<mpsc::Receiver<PipelineJob>>>;

/// In-process handoff between task creation and the workers. Keeping the
/// upload in memory means it is never written next to the task row.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<PipelineJob>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, Arc::new(Mutex::new(receiver)))
    }

    pub async fn enqueue(&self, job: PipelineJob) -> WorkerResult<()> {
        let task_id = job.task_id;
        self.sender
            .send(job)
            .await
            .map_err(|_| WorkerError::QueueClosed)?;
        tracing::debug!("Queued task {} for the pipeline", task_id);
        Ok(())
    }
}
