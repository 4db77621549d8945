// src/db/queries/attachment.rs
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Extension, Multipart, Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::PgPool;
use tokio::fs;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::api::auth::Claims;
use crate::config::Config;
use crate::db::models::attachment::Attachment;
use crate::middleware::auth::UserAccess;
use crate::utils::api_response::ApiResponse;

use super::request::get_request_by_id;

//
// Attachments are stored under:
//   {ATTACHMENT_STORAGE_PATH}/{request_id}/{uuid}_{original_filename}
// Only metadata lives in the database.
//

fn get_attachment_dir(request_id: i32) -> PathBuf {
    Config::get()
        .attachment_storage_path
        .join(request_id.to_string())
}

#[utoipa::path(
    post,
    path = "/requests/{request_id}/attachments",
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 201, description = "Attachment uploaded", body = Attachment),
        (status = 403, description = "Only the creator attaches documents"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is in a terminal state"),
        (status = 422, description = "No file in the multipart payload"),
        (status = 500, description = "Failed to store attachment")
    ),
    tag = "Attachments",
    security(("bearerAuth" = []))
)]
pub async fn upload_attachment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    AxumPath(request_id): AxumPath<i32>,
    mut multipart: Multipart,
) -> Result<ApiResponse<Attachment>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    let request = get_request_by_id(&pool, request_id).await?;

    if request.created_by != user_id {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the creator can attach documents to a request",
            None,
        ));
    }
    if request.status.is_terminal() {
        return Err(ApiResponse::<()>::error(
            StatusCode::CONFLICT,
            "Cannot attach documents to a completed or rejected request",
            None,
        ));
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::BAD_REQUEST,
                "Invalid multipart payload",
                Some(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            ApiResponse::<()>::error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "No file in the multipart payload",
                None,
            )
        })?;

    let file_name = field
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| "document".to_string());
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Failed to read uploaded file",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    let dir = get_attachment_dir(request_id);
    fs::create_dir_all(&dir).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create attachment directory",
            Some(json!({ "message": e.to_string() })),
        )
    })?;

    let stored_name = format!("{}_{}", Uuid::new_v4(), file_name);
    let final_path = dir.join(&stored_name);
    fs::write(&final_path, &bytes).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to write attachment file",
            Some(json!({ "message": e.to_string() })),
        )
    })?;

    let attachment = sqlx::query_as::<_, Attachment>(
        r#"
        INSERT INTO attachments (request_id, file_name, storage_path, content_type, size_bytes, uploaded_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, request_id, file_name, storage_path, content_type, size_bytes, uploaded_by, uploaded_at
        "#,
    )
    .bind(request_id)
    .bind(&file_name)
    .bind(final_path.to_string_lossy().to_string())
    .bind(&content_type)
    .bind(bytes.len() as i64)
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to record attachment",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Attachment uploaded",
        attachment,
    ))
}

#[utoipa::path(
    get,
    path = "/requests/{request_id}/attachments",
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Attachments listed", body = Vec<Attachment>),
        (status = 403, description = "No access to this request"),
        (status = 404, description = "Request not found")
    ),
    tag = "Attachments",
    security(("bearerAuth" = []))
)]
pub async fn list_attachments(
    State(pool): State<PgPool>,
    Extension(access): Extension<UserAccess>,
    AxumPath(request_id): AxumPath<i32>,
) -> Result<ApiResponse<Vec<Attachment>>, ApiResponse<()>> {
    let request = get_request_by_id(&pool, request_id).await?;
    if !access.can_view(&request) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You don't have access to this request",
            None,
        ));
    }

    let attachments = sqlx::query_as::<_, Attachment>(
        r#"
        SELECT id, request_id, file_name, storage_path, content_type, size_bytes, uploaded_by, uploaded_at
        FROM attachments
        WHERE request_id = $1
        ORDER BY uploaded_at ASC
        "#,
    )
    .bind(request_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve attachments",
            Some(json!({ "error": e.to_string() })),
        )
    })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Attachments",
        attachments,
    ))
}

#[utoipa::path(
    get,
    path = "/attachments/{attachment_id}/download",
    params(("attachment_id" = i32, Path, description = "Attachment ID")),
    responses(
        (status = 200, description = "Attachment file stream"),
        (status = 403, description = "No access to the parent request"),
        (status = 404, description = "Attachment not found"),
        (status = 500, description = "Failed to open attachment file")
    ),
    tag = "Attachments",
    security(("bearerAuth" = []))
)]
pub async fn download_attachment(
    State(pool): State<PgPool>,
    Extension(access): Extension<UserAccess>,
    AxumPath(attachment_id): AxumPath<i32>,
) -> Result<Response, ApiResponse<()>> {
    let attachment = sqlx::query_as::<_, Attachment>(
        r#"
        SELECT id, request_id, file_name, storage_path, content_type, size_bytes, uploaded_by, uploaded_at
        FROM attachments
        WHERE id = $1
        "#,
    )
    .bind(attachment_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve attachment",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Attachment not found", None))?;

    let request = get_request_by_id(&pool, attachment.request_id).await?;
    if !access.can_view(&request) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You don't have access to this request",
            None,
        ));
    }

    let file = fs::File::open(&attachment.storage_path).await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to open attachment file",
            Some(json!({ "message": e.to_string() })),
        )
    })?;

    let stream = ReaderStream::new(file);
    let content_type = attachment
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", attachment.file_name),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(upload_attachment, list_attachments, download_attachment),
    components(schemas(Attachment)),
    tags(
        (name = "Attachments", description = "Supporting documents for requests")
    )
)]
pub struct AttachmentDoc;
