use axum::{
    middleware::Next,
    response::{IntoResponse, Response},
    extract::Request,
};
use tower_sessions::Session;
use crate::errors::AppError;
use crate::handlers::SESSION_KEY;
use crate::models::UserId;

// Routes reachable without a session.
const PUBLIC_PATHS: [&str; 2] = ["/login", "/register"];

pub async fn require_auth(
    session: Session,
    req: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    match session.get::<UserId>(SESSION_KEY).await {
        Ok(Some(_)) => next.run(req).await,
        Ok(None) => AppError::Auth("Not authenticated".into()).into_response(),
        Err(e) => AppError::Auth(format!("Session error: {}", e)).into_response(),
    }
}
