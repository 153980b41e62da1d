use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
};
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::TaskQuery;
use super::{auth::current_user, AppState};

/// The session user's tasks, optionally narrowed to one status.
pub async fn list_tasks(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<TaskQuery>,
) -> AppResult<Response> {
    let user = current_user(&state, &session).await?;
    let user_id = user
        .id
        .ok_or_else(|| AppError::Auth("Stored user has no id".into()))?;

    let tasks = match query.status {
        Some(status) => state.tasks.find_by_user_id_and_status(user_id, status).await?,
        None => state.tasks.find_tasks_by_user_id(user_id).await?,
    };
    Ok(Json(tasks).into_response())
}

pub async fn list_all_tasks(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Response> {
    let user = current_user(&state, &session).await?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("Listing every task requires ADMIN".into()));
    }

    let tasks = state.tasks.find_all().await?;
    Ok(Json(tasks).into_response())
}
