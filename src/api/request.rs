use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::audit_log::list_request_audit;
use crate::db::queries::request::*;

pub fn request_routes() -> Router<PgPool> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests", get(list_requests))
        .route("/requests/{request_id}", get(get_request_handler))
        .route("/requests/{request_id}/validation", patch(validate_request))
        .route("/requests/{request_id}/processing", patch(process_request))
        .route("/requests/{request_id}/treatment", patch(treat_request))
        .route("/requests/{request_id}/resubmit", post(resubmit_request))
        .route("/requests/{request_id}/audit", get(list_request_audit))
}
