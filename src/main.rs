use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use epibuilder::{
    config::{Config, StorageBackend},
    handlers::{self, AppState},
    repository::{MemoryStore, RedisStore, TaskRepository, UserRepository},
    services::{TaskService, UserService},
    worker::{CommandPipeline, EpitopePipeline, JobQueue, Worker},
};

fn repositories<S>(store: S) -> (Arc<dyn TaskRepository>, Arc<dyn UserRepository>)
where
    S: TaskRepository + UserRepository + 'static,
{
    let store = Arc::new(store);
    (store.clone(), store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize basic tracing subscriber
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    let (task_repository, user_repository) = match config.storage.backend {
        StorageBackend::Redis => repositories(
            RedisStore::connect(&config.storage).context("Failed to connect to Redis")?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            repositories(MemoryStore::new())
        }
    };
    let task_service = TaskService::new(task_repository);
    let user_service = UserService::new(user_repository);

    // Initialize worker pool with configured values
    let (jobs, receiver) = JobQueue::new(config.worker.queue_capacity);
    let semaphore = Arc::new(Semaphore::new(config.worker.max_concurrent_tasks));
    let pipeline: Arc<dyn EpitopePipeline> = Arc::new(CommandPipeline::new(&config.pipeline));
    let worker = Worker::new(
        task_service.clone(),
        pipeline,
        semaphore,
        Duration::from_secs(config.worker.timeout_secs),
    );
    for _ in 0..config.worker.worker_count {
        tokio::spawn(worker.clone().run(receiver.clone()));
    }

    let state = AppState {
        tasks: task_service,
        users: user_service,
        jobs,
    };
    let app = handlers::router(state, config.upload.max_file_size);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server running on {}", address);

    axum::serve(listener, app.into_make_service())
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
