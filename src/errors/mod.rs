// Error taxonomy shared by the storage, service, worker and HTTP layers.
use thiserror::Error;

pub mod response;
pub mod worker;

pub use worker::{WorkerError, WorkerResult};

/// Failures raised at the storage boundary. Callers receive them unmodified.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    // An EXEC kept aborting because watched keys changed underneath it.
    #[error("Transaction failed after {0} attempts")]
    TransactionFailure(u32),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // The #[from] attribute lets storage failures propagate with `?` untouched.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Credential error: {0}")]
    Credential(#[from] bcrypt::BcryptError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

// Custom result type
pub type AppResult<T> = Result<T, AppError>;
