use axum::{routing::get, Router};
use sqlx::PgPool;

use crate::db::queries::user::*;

pub fn user_routes() -> Router<PgPool> {
    Router::new().route("/users/handlers", get(list_handlers))
}
