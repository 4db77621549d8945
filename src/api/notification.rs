use axum::{
    routing::{get, patch},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::notification::*;

pub fn notification_routes() -> Router<PgPool> {
    Router::new()
        .route("/notifications", get(get_notifications))
        .route("/notifications/count", get(get_notification_count))
        .route(
            "/notifications/{notification_id}/read",
            patch(mark_notification_read),
        )
}
