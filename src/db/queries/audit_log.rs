// src/db/queries/audit_log.rs
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
};
use serde_json::json;
use sqlx::PgPool;

use crate::db::models::audit_log::{AuditAction, AuditLog};
use crate::middleware::auth::UserAccess;
use crate::utils::api_response::ApiResponse;

use super::request::get_request_by_id;

/// Audit trail of a request, oldest entry first.
#[utoipa::path(
    get,
    path = "/requests/{request_id}/audit",
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Audit trail retrieved", body = Vec<AuditLog>),
        (status = 403, description = "Only admins read audit trails"),
        (status = 404, description = "Request not found"),
        (status = 500, description = "Failed to retrieve audit trail")
    ),
    tag = "Audit",
    security(("bearerAuth" = []))
)]
pub async fn list_request_audit(
    State(pool): State<PgPool>,
    Extension(access): Extension<UserAccess>,
    Path(request_id): Path<i32>,
) -> Result<ApiResponse<Vec<AuditLog>>, ApiResponse<()>> {
    if !access.is_admin() {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only administrators can read audit trails",
            None,
        ));
    }

    // 404 for unknown ids rather than an empty list.
    get_request_by_id(&pool, request_id).await?;

    let entries = sqlx::query_as::<_, AuditLog>(
        r#"
        SELECT id, request_id, actor_id, action, before, after, created_at
        FROM audit_log
        WHERE request_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(request_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve audit trail",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(StatusCode::OK, "Audit trail", entries))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(list_request_audit),
    components(schemas(AuditLog, AuditAction)),
    tags(
        (name = "Audit", description = "Append-only request audit trail")
    )
)]
pub struct AuditDoc;
