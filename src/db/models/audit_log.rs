// src/db/models/audit_log.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Validate,
    RejectValidation,
    Assign,
    StartProcessing,
    Approve,
    Reject,
    Resubmit,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Validate => "validate",
            AuditAction::RejectValidation => "reject_validation",
            AuditAction::Assign => "assign",
            AuditAction::StartProcessing => "start_processing",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::Resubmit => "resubmit",
        }
    }
}

/// Append-only record of an action against a request, with before/after
/// snapshots of the row. Never mutated or deleted.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct AuditLog {
    pub id: i32,
    pub request_id: i32,
    pub actor_id: i32,
    pub action: AuditAction,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub created_at: NaiveDateTime,
}
