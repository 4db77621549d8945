// src/db/models/attachment.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// File metadata for a document attached to a request. The bytes live on
/// disk under the configured attachment root; only metadata is stored.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct Attachment {
    pub id: i32,
    pub request_id: i32,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: i32,
    pub uploaded_at: NaiveDateTime,
}
