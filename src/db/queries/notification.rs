// src/db/queries/notification.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use serde_json::json;
use sqlx::{PgPool, QueryBuilder};

use crate::api::auth::Claims;
use crate::db::models::notification::{
    Notification, NotificationCountResponse, NotificationFilter,
};
use crate::utils::api_response::ApiResponse;

/// Get notifications addressed to the current user
#[utoipa::path(
    get,
    path = "/notifications",
    params(NotificationFilter),
    responses(
        (status = 200, description = "Notifications retrieved successfully", body = Vec<Notification>),
        (status = 500, description = "Failed to retrieve notifications")
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn get_notifications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<NotificationFilter>,
) -> Result<ApiResponse<Vec<Notification>>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let mut qb = QueryBuilder::new(
        "SELECT id, user_id, request_id, notif_type, title, body, is_read, created_at \
         FROM notifications WHERE user_id = ",
    );
    qb.push_bind(user_id);

    if filter.unread_only.unwrap_or(false) {
        qb.push(" AND is_read = FALSE");
    }

    qb.push(" ORDER BY created_at DESC");
    qb.push(" LIMIT ").push_bind(filter.limit.unwrap_or(50) as i64);
    qb.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0) as i64);

    let notifications = qb
        .build_query_as::<Notification>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve notifications",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notifications",
        notifications,
    ))
}

/// Total and unread notification counts for the current user
#[utoipa::path(
    get,
    path = "/notifications/count",
    responses(
        (status = 200, description = "Notification counts", body = NotificationCountResponse),
        (status = 500, description = "Failed to count notifications")
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn get_notification_count(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<ApiResponse<NotificationCountResponse>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let counts: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(*) FILTER (WHERE is_read = FALSE)
        FROM notifications
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to count notifications",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notification counts",
        NotificationCountResponse {
            total: counts.0,
            unread: counts.1,
        },
    ))
}

/// Mark one of the current user's notifications as read. The read flag
/// is the only mutable field of a notification.
#[utoipa::path(
    patch,
    path = "/notifications/{notification_id}/read",
    params(("notification_id" = i32, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 404, description = "Notification not found"),
        (status = 500, description = "Failed to update notification")
    ),
    tag = "Notifications",
    security(("bearerAuth" = []))
)]
pub async fn mark_notification_read(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<i32>,
) -> Result<ApiResponse<Notification>, ApiResponse<()>> {
    let user_id = claims.user_id()?;

    let notification = sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET is_read = TRUE
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, request_id, notif_type, title, body, is_read, created_at
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update notification",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Notification not found", None)
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Notification marked as read",
        notification,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(get_notifications, get_notification_count, mark_notification_read),
    components(schemas(Notification, NotificationCountResponse)),
    tags(
        (name = "Notifications", description = "Per-user lifecycle notifications")
    )
)]
pub struct NotificationDoc;
