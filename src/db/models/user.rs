// src/db/models/user.rs
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Public view of a user, used for routing candidate lists. Never exposes
/// the password hash.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub full_name: Option<String>,
    pub role: String,
    pub program: Option<String>,
}

pub mod roles {
    pub const STUDENT: &str = "student";
    pub const ADMIN: &str = "admin";
    pub const TEACHER: &str = "teacher";
    pub const DEPARTMENT_HEAD: &str = "department_head";

    pub const ALL: &[&str] = &[STUDENT, ADMIN, TEACHER, DEPARTMENT_HEAD];
}
