use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::{LoginForm, RegisterForm, Role, User, UserId};
use super::AppState;

pub(crate) const SESSION_KEY: &str = "user_session";

/// Resolves the identity behind the request's session.
pub(crate) async fn current_user(state: &AppState, session: &Session) -> AppResult<User> {
    let user_id = session
        .get::<UserId>(SESSION_KEY)
        .await
        .map_err(|e| AppError::Auth(format!("Session error: {}", e)))?
        .ok_or_else(|| AppError::Auth("Not authenticated".into()))?;

    state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Auth("User not found".into()))
}

pub async fn handle_register(
    State(state): State<AppState>,
    Form(register_form): Form<RegisterForm>,
) -> AppResult<Response> {
    if register_form.password != register_form.confirm_password {
        return Err(AppError::Validation("Passwords don't match".into()));
    }

    let role = register_form.role.unwrap_or(Role::User);
    if role == Role::Admin {
        return Err(AppError::Forbidden("Administrators cannot self-register".into()));
    }

    let user = state
        .users
        .register(
            &register_form.name,
            &register_form.username,
            &register_form.password,
            role,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user.profile())).into_response())
}

pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    Form(login_form): Form<LoginForm>,
) -> AppResult<Response> {
    tracing::info!("Login attempt for user: {}", login_form.username);

    let user = state
        .users
        .authenticate(&login_form.username, &login_form.password)
        .await?;
    let user_id = user
        .id
        .ok_or_else(|| AppError::Auth("Stored user has no id".into()))?;

    session
        .insert(SESSION_KEY, user_id)
        .await
        .map_err(|e| AppError::Auth(format!("Session error: {}", e)))?;

    Ok(Json(user.profile()).into_response())
}

pub async fn handle_logout(session: Session) -> Response {
    if let Err(e) = session.remove::<UserId>(SESSION_KEY).await {
        tracing::warn!("Session removal error: {}", e);
    }
    StatusCode::NO_CONTENT.into_response()
}

pub async fn current_profile(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Response> {
    let user = current_user(&state, &session).await?;
    Ok(Json(user.profile()).into_response())
}
