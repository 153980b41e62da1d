use thiserror::Error;
use std::io;
use std::time::Duration;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task panicked: {0}")]
    TaskPanic(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Job queue is closed")]
    QueueClosed,
}

pub type WorkerResult<T> = Result<T, WorkerError>;
