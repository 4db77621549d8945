use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::attachment::*;

pub fn attachment_routes() -> Router<PgPool> {
    Router::new()
        .route("/requests/{request_id}/attachments", post(upload_attachment))
        .route("/requests/{request_id}/attachments", get(list_attachments))
        .route(
            "/attachments/{attachment_id}/download",
            get(download_attachment),
        )
}
