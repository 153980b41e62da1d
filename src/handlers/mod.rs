mod auth;
mod task;
mod dashboard;

pub(crate) use auth::SESSION_KEY;
pub use auth::{handle_login, handle_register, handle_logout, current_profile};
pub use task::{create_task, get_task, delete_task};
pub use dashboard::{list_tasks, list_all_tasks};

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_sessions::{cookie::SameSite, MemoryStore, SessionManagerLayer};
use crate::middleware;
use crate::services::{TaskService, UserService};
use crate::worker::JobQueue;

// Application state that can be shared between handlers
#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskService,
    pub users: UserService,
    pub jobs: JobQueue,
}

/// Builds the HTTP surface: authentication, task CRUD and the two filtered
/// task listings.
pub fn router(state: AppState, max_upload_size: usize) -> Router {
    // Session store setup
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_name("session");

    Router::new()
        // Auth routes
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/logout", get(handle_logout))
        .route("/me", get(current_profile))

        // Task routes
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:task_id", get(get_task).delete(delete_task))
        .route("/admin/tasks", get(list_all_tasks))

        // Add middleware
        .layer(from_fn(middleware::require_auth))
        .layer(session_layer)

        // File upload limits from config
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_size))

        .with_state(state)
}
