use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleError;

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response
    pub fn success(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: Some(data),
            errors: None,
        }
    }

    /// Create an error response
    pub fn error(
        status: StatusCode,
        message: impl Into<String>,
        errors: Option<serde_json::Value>,
    ) -> Self {
        ApiResponse {
            success: false,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: None,
            errors,
        }
    }
}

impl ApiResponse<()> {
    /// Map a lifecycle guard failure to an API error. Guard violations
    /// are rejected before any write, so everything here is a client
    /// error: state conflicts are 409, missing guard fields are 422.
    pub fn from_lifecycle_error(err: LifecycleError) -> Self {
        let status = match err {
            LifecycleError::NotPending
            | LifecycleError::NotValidated
            | LifecycleError::NotRejected
            | LifecycleError::AlreadyRouted
            | LifecycleError::Terminal => StatusCode::CONFLICT,
            LifecycleError::MissingReason
            | LifecycleError::MissingComment
            | LifecycleError::MissingGradeType
            | LifecycleError::MissingHandler
            | LifecycleError::EmptyTitle
            | LifecycleError::TitleTooLong
            | LifecycleError::EmptyDescription => StatusCode::UNPROCESSABLE_ENTITY,
        };
        ApiResponse::error(status, err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_failures_map_to_client_errors() {
        let conflict = ApiResponse::from_lifecycle_error(LifecycleError::Terminal);
        assert_eq!(conflict.status_code, StatusCode::CONFLICT.as_u16());
        assert!(!conflict.success);

        let unprocessable = ApiResponse::from_lifecycle_error(LifecycleError::MissingReason);
        assert_eq!(
            unprocessable.status_code,
            StatusCode::UNPROCESSABLE_ENTITY.as_u16()
        );
    }
}
