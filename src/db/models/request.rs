// src/db/models/request.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "request_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    GradeInquiry,
    AbsenceJustification,
    CertificateRequest,
    GradeCorrection,
    ScheduleChange,
    Other,
}

/// Grade classification for grade inquiries: continuous assessment (CC)
/// or final session (SN). Picks the routing target at submission time.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "grade_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GradeType {
    Cc,
    Sn,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    Validated,
    Assigned,
    Processing,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Submitted => "submitted",
            RequestStatus::Validated => "validated",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Terminal states admit no further transition except resubmission
    /// after a validation rejection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Rejected)
    }
}

/// Administrative conformity gate, subordinate to `RequestStatus`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "validation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Validated,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Validated => "validated",
            ValidationStatus::Rejected => "rejected",
        }
    }
}

/// Handler decision, subordinate to validation. Null until treated.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "final_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Approved,
    Rejected,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Approved => "approved",
            FinalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct Request {
    pub id: i32,
    pub request_type: RequestType,
    pub grade_type: Option<GradeType>,
    pub issue_subcategory: Option<String>,
    pub title: String,
    pub description: String,
    pub status: RequestStatus,
    pub validation_status: ValidationStatus,
    pub final_status: Option<FinalStatus>,
    pub routed_to: Option<i32>,
    pub routed_to_role: Option<String>,
    pub rejection_reason: Option<String>,
    pub final_comment: Option<String>,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolved_by: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewRequest {
    pub request_type: RequestType,
    pub grade_type: Option<GradeType>,
    pub issue_subcategory: Option<String>,
    pub title: String,
    pub description: String,
    /// Handler chosen by the requester. Required for grade inquiries,
    /// ignored for every other request type.
    pub routed_to: Option<i32>,
}

/// Outcome of a review step (validation or treatment).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationDecision {
    pub decision: ReviewOutcome,
    /// Required when rejecting.
    pub rejection_reason: Option<String>,
    /// Routing for requests the requester did not route. Rejected with a
    /// conflict for requests already routed at submission.
    pub routed_to: Option<i32>,
    pub routed_to_role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TreatmentDecision {
    pub decision: ReviewOutcome,
    /// Required when rejecting, optional when approving.
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResubmitRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, IntoParams, ToSchema)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub validation_status: Option<ValidationStatus>,
    pub request_type: Option<RequestType>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
