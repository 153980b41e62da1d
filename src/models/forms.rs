use serde::Deserialize;
use super::task::TaskStatus;
use super::user::Role;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
}
