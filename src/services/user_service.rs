use bcrypt::{hash, verify, DEFAULT_COST};
use std::sync::Arc;
use crate::errors::{AppError, AppResult};
use crate::models::{Role, User, UserId};
use crate::repository::UserRepository;

/// Registration and credential checks. The stored hash never leaves here
/// except inside the [`User`] handed back to the authentication flow.
#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
    cost: u32,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self {
            repository,
            cost: DEFAULT_COST,
        }
    }

    /// Overrides the bcrypt work factor.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub async fn register(
        &self,
        name: &str,
        username: &str,
        password: &str,
        role: Role,
    ) -> AppResult<User> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation("username and password are required".into()));
        }

        let password_hash = hash(password.as_bytes(), self.cost)?;
        let user = self
            .repository
            .save_user(User {
                id: None,
                name: name.to_string(),
                username: username.to_string(),
                password_hash,
                role,
            })
            .await?;

        tracing::info!("Registered user {} with role {}", user.username, user.role);
        Ok(user)
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<User> {
        let user = self
            .repository
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::Auth("Username does not exist".into()))?;

        if !verify(password, &user.password_hash)? {
            tracing::info!("Invalid password for user: {}", username);
            return Err(AppError::Auth("Password is incorrect".into()));
        }

        tracing::debug!("Password verified for user: {}", username);
        Ok(user)
    }

    pub async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.repository.find_user_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::repository::MemoryStore;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryStore::new())).with_cost(4)
    }

    #[tokio::test]
    async fn registered_user_can_authenticate() {
        let users = service();
        let registered = users.register("Ana", "ana", "s3cret", Role::Researcher).await.unwrap();
        assert_ne!(registered.password_hash, "s3cret");

        let user = users.authenticate("ana", "s3cret").await.unwrap();
        assert_eq!(user.id, registered.id);
        assert_eq!(user.authorities()[0].name(), "RESEARCHER");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_auth_errors() {
        let users = service();
        users.register("Ana", "ana", "s3cret", Role::User).await.unwrap();
        assert!(matches!(users.authenticate("ana", "nope").await, Err(AppError::Auth(_))));
        assert!(matches!(users.authenticate("bob", "s3cret").await, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn duplicate_username_is_a_constraint_violation() {
        let users = service();
        users.register("Ana", "ana", "one", Role::User).await.unwrap();
        let err = users.register("Ana B", "ana", "two", Role::User).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::ConstraintViolation(_))));
    }
}
