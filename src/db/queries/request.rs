// src/db/queries/request.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, QueryBuilder};

use crate::api::auth::Claims;
use crate::db::models::audit_log::AuditAction;
use crate::db::models::request::{
    NewRequest, Request, RequestFilter, ResubmitRequest, ReviewOutcome, TreatmentDecision,
    ValidationDecision,
};
use crate::db::models::user::{roles, UserSummary};
use crate::lifecycle::{self, Routing};
use crate::middleware::auth::UserAccess;
use crate::utils::api_response::ApiResponse;
use crate::utils::{audit, notification};

const REQUEST_COLUMNS: &str = "id, request_type, grade_type, issue_subcategory, title, \
     description, status, validation_status, final_status, routed_to, routed_to_role, \
     rejection_reason, final_comment, created_by, created_at, updated_at, resolved_at, \
     resolved_by";

pub async fn get_request_by_id(
    pool: &PgPool,
    request_id: i32,
) -> Result<Request, ApiResponse<()>> {
    sqlx::query_as::<_, Request>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"
    ))
    .bind(request_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve request",
            Some(json!({ "error": e.to_string() })),
        )
    })?
    .ok_or_else(|| ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Request not found", None))
}

/// Applies a lifecycle patch as a single UPDATE. Only columns the engine
/// touched are written; `updated_at` always advances.
async fn apply_patch(
    pool: &PgPool,
    request_id: i32,
    patch: lifecycle::RequestPatch,
) -> Result<Request, sqlx::Error> {
    let mut qb = QueryBuilder::new("UPDATE requests SET updated_at = NOW()");

    if let Some(status) = patch.status {
        qb.push(", status = ").push_bind(status);
    }
    if let Some(validation_status) = patch.validation_status {
        qb.push(", validation_status = ").push_bind(validation_status);
    }
    if let Some(final_status) = patch.final_status {
        qb.push(", final_status = ").push_bind(final_status);
    }
    if let Some(routed_to) = patch.routed_to {
        qb.push(", routed_to = ").push_bind(routed_to);
    }
    if let Some(routed_to_role) = patch.routed_to_role {
        qb.push(", routed_to_role = ").push_bind(routed_to_role);
    }
    if let Some(rejection_reason) = patch.rejection_reason {
        qb.push(", rejection_reason = ").push_bind(rejection_reason);
    }
    if let Some(final_comment) = patch.final_comment {
        qb.push(", final_comment = ").push_bind(final_comment);
    }
    if let Some(resolved_at) = patch.resolved_at {
        qb.push(", resolved_at = ").push_bind(resolved_at);
    }
    if let Some(resolved_by) = patch.resolved_by {
        qb.push(", resolved_by = ").push_bind(resolved_by);
    }
    if let Some(title) = patch.title {
        qb.push(", title = ").push_bind(title);
    }
    if let Some(description) = patch.description {
        qb.push(", description = ").push_bind(description);
    }

    qb.push(" WHERE id = ").push_bind(request_id);
    qb.push(format!(" RETURNING {REQUEST_COLUMNS}"));

    qb.build_query_as::<Request>().fetch_one(pool).await
}

fn store_error(e: sqlx::Error, message: &str) -> ApiResponse<()> {
    ApiResponse::<()>::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        message,
        Some(json!({ "error": e.to_string() })),
    )
}

/// Looks up a routing target and checks it actually is a handler.
async fn resolve_handler(pool: &PgPool, handler_id: i32) -> Result<UserSummary, ApiResponse<()>> {
    let handler = sqlx::query_as::<_, UserSummary>(
        "SELECT id, username, full_name, role, program FROM users WHERE id = $1",
    )
    .bind(handler_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| store_error(e, "Failed to look up handler"))?
    .ok_or_else(|| ApiResponse::<()>::error(StatusCode::NOT_FOUND, "Handler not found", None))?;

    if handler.role != roles::TEACHER && handler.role != roles::DEPARTMENT_HEAD {
        return Err(ApiResponse::<()>::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Routing target is not a teacher or department head",
            None,
        ));
    }
    Ok(handler)
}

#[utoipa::path(
    post,
    path = "/requests",
    request_body = NewRequest,
    responses(
        (status = 201, description = "Request submitted successfully", body = Request),
        (status = 403, description = "Only students submit requests"),
        (status = 422, description = "Invalid payload (missing routing, empty fields)"),
        (status = 500, description = "Failed to insert request")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn create_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(access): Extension<UserAccess>,
    Json(payload): Json<NewRequest>,
) -> Result<ApiResponse<Request>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    if !access.is_student() {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only students can submit requests",
            None,
        ));
    }

    lifecycle::check_content(&payload.title, &payload.description)
        .map_err(ApiResponse::from_lifecycle_error)?;

    let submission = lifecycle::submit(payload.request_type, payload.grade_type, payload.routed_to)
        .map_err(ApiResponse::from_lifecycle_error)?;

    // The chosen handler must exist and carry the role the grade type
    // demands (teacher for CC, department head for SN).
    if let (Some(handler_id), Some(expected_role)) =
        (submission.routed_to, submission.routed_to_role.as_deref())
    {
        let handler = resolve_handler(&pool, handler_id).await?;
        if handler.role != expected_role {
            return Err(ApiResponse::<()>::error(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("This grade type must be routed to a {}", expected_role),
                None,
            ));
        }
    }

    let request = sqlx::query_as::<_, Request>(&format!(
        r#"
        INSERT INTO requests (
            request_type, grade_type, issue_subcategory, title, description,
            status, validation_status, routed_to, routed_to_role, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(payload.request_type)
    .bind(payload.grade_type)
    .bind(&payload.issue_subcategory)
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(submission.status)
    .bind(submission.validation_status)
    .bind(submission.routed_to)
    .bind(&submission.routed_to_role)
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| store_error(e, "Failed to insert request"))?;

    // Best-effort side effects, never rolled into the insert.
    notification::dispatch_events(&pool, request.id, &request.title, &submission.events).await;
    audit::record_action(&pool, user_id, AuditAction::Create, None, &request).await;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Request submitted",
        request,
    ))
}

#[utoipa::path(
    get,
    path = "/requests",
    params(RequestFilter),
    responses(
        (status = 200, description = "Role-scoped list of requests", body = Vec<Request>),
        (status = 500, description = "Failed to retrieve requests")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn list_requests(
    State(pool): State<PgPool>,
    Extension(access): Extension<UserAccess>,
    Query(filter): Query<RequestFilter>,
) -> Result<ApiResponse<Vec<Request>>, ApiResponse<()>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {REQUEST_COLUMNS} FROM requests WHERE TRUE"
    ));

    // Students see their own requests, handlers what is routed to them,
    // admins everything.
    if access.is_student() {
        qb.push(" AND created_by = ").push_bind(access.user_id);
    } else if access.is_handler() {
        qb.push(" AND routed_to = ").push_bind(access.user_id);
    } else if !access.is_admin() {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Unknown role for request listing",
            None,
        ));
    }

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(validation_status) = filter.validation_status {
        qb.push(" AND validation_status = ").push_bind(validation_status);
    }
    if let Some(request_type) = filter.request_type {
        qb.push(" AND request_type = ").push_bind(request_type);
    }

    qb.push(" ORDER BY created_at DESC");
    qb.push(" LIMIT ").push_bind(filter.limit.unwrap_or(50) as i64);
    qb.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0) as i64);

    let requests = qb
        .build_query_as::<Request>()
        .fetch_all(&pool)
        .await
        .map_err(|e| store_error(e, "Failed to retrieve requests"))?;

    Ok(ApiResponse::success(StatusCode::OK, "Requests", requests))
}

#[utoipa::path(
    get,
    path = "/requests/{request_id}",
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request retrieved", body = Request),
        (status = 403, description = "Not creator, handler, or admin"),
        (status = 404, description = "Request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_request_handler(
    State(pool): State<PgPool>,
    Extension(access): Extension<UserAccess>,
    Path(request_id): Path<i32>,
) -> Result<ApiResponse<Request>, ApiResponse<()>> {
    let request = get_request_by_id(&pool, request_id).await?;
    if !access.can_view(&request) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "You don't have access to this request",
            None,
        ));
    }
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request retrieved",
        request,
    ))
}

#[utoipa::path(
    patch,
    path = "/requests/{request_id}/validation",
    request_body = ValidationDecision,
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Validation decision recorded", body = Request),
        (status = 403, description = "Only admins validate requests"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not awaiting validation or already routed"),
        (status = 422, description = "Missing rejection reason"),
        (status = 500, description = "Failed to update request")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn validate_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(access): Extension<UserAccess>,
    Path(request_id): Path<i32>,
    Json(payload): Json<ValidationDecision>,
) -> Result<ApiResponse<Request>, ApiResponse<()>> {
    let actor_id = claims.user_id()?;
    if !access.can_validate() {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only administrators can validate requests",
            None,
        ));
    }

    let request = get_request_by_id(&pool, request_id).await?;

    let transition = match payload.decision {
        ReviewOutcome::Approved => {
            let routing = match payload.routed_to {
                Some(handler_id) => {
                    let handler = resolve_handler(&pool, handler_id).await?;
                    Some(Routing {
                        handler_id,
                        handler_role: handler.role,
                    })
                }
                None => None,
            };
            lifecycle::approve_validation(&request, routing)
                .map_err(ApiResponse::from_lifecycle_error)?
        }
        ReviewOutcome::Rejected => {
            let reason = payload.rejection_reason.as_deref().unwrap_or_default();
            lifecycle::reject_validation(&request, reason)
                .map_err(ApiResponse::from_lifecycle_error)?
        }
    };

    let freshly_routed = transition.patch.routed_to.is_some();
    let updated = apply_patch(&pool, request_id, transition.patch)
        .await
        .map_err(|e| store_error(e, "Failed to update request"))?;

    notification::dispatch_events(&pool, updated.id, &updated.title, &transition.events).await;

    let action = match payload.decision {
        ReviewOutcome::Approved => AuditAction::Validate,
        ReviewOutcome::Rejected => AuditAction::RejectValidation,
    };
    audit::record_action(&pool, actor_id, action, Some(&request), &updated).await;
    if freshly_routed {
        audit::record_action(&pool, actor_id, AuditAction::Assign, Some(&request), &updated).await;
    }

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Validation decision recorded",
        updated,
    ))
}

#[utoipa::path(
    patch,
    path = "/requests/{request_id}/processing",
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request marked as processing", body = Request),
        (status = 403, description = "Only the routed handler can process"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not in a processable state")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn process_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(access): Extension<UserAccess>,
    Path(request_id): Path<i32>,
) -> Result<ApiResponse<Request>, ApiResponse<()>> {
    let actor_id = claims.user_id()?;
    let request = get_request_by_id(&pool, request_id).await?;
    if !access.can_treat(&request) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the routed handler can process this request",
            None,
        ));
    }

    let transition =
        lifecycle::start_processing(&request).map_err(ApiResponse::from_lifecycle_error)?;
    let updated = apply_patch(&pool, request_id, transition.patch)
        .await
        .map_err(|e| store_error(e, "Failed to update request"))?;

    audit::record_action(
        &pool,
        actor_id,
        AuditAction::StartProcessing,
        Some(&request),
        &updated,
    )
    .await;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request marked as processing",
        updated,
    ))
}

#[utoipa::path(
    patch,
    path = "/requests/{request_id}/treatment",
    request_body = TreatmentDecision,
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Treatment decision recorded", body = Request),
        (status = 403, description = "Only the routed handler can treat"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request has not passed validation or is terminal"),
        (status = 422, description = "Missing rejection comment"),
        (status = 500, description = "Failed to update request")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn treat_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(access): Extension<UserAccess>,
    Path(request_id): Path<i32>,
    Json(payload): Json<TreatmentDecision>,
) -> Result<ApiResponse<Request>, ApiResponse<()>> {
    let handler_id = claims.user_id()?;
    let request = get_request_by_id(&pool, request_id).await?;
    if !access.can_treat(&request) {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the routed handler can treat this request",
            None,
        ));
    }

    let transition = match payload.decision {
        ReviewOutcome::Approved => lifecycle::approve_treatment(
            &request,
            handler_id,
            payload.comment.as_deref(),
            Utc::now().naive_utc(),
        )
        .map_err(ApiResponse::from_lifecycle_error)?,
        ReviewOutcome::Rejected => {
            let comment = payload.comment.as_deref().unwrap_or_default();
            lifecycle::reject_treatment(&request, comment)
                .map_err(ApiResponse::from_lifecycle_error)?
        }
    };

    let updated = apply_patch(&pool, request_id, transition.patch)
        .await
        .map_err(|e| store_error(e, "Failed to update request"))?;

    notification::dispatch_events(&pool, updated.id, &updated.title, &transition.events).await;

    let action = match payload.decision {
        ReviewOutcome::Approved => AuditAction::Approve,
        ReviewOutcome::Rejected => AuditAction::Reject,
    };
    audit::record_action(&pool, handler_id, action, Some(&request), &updated).await;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Treatment decision recorded",
        updated,
    ))
}

#[utoipa::path(
    post,
    path = "/requests/{request_id}/resubmit",
    request_body = ResubmitRequest,
    params(("request_id" = i32, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request resubmitted", body = Request),
        (status = 403, description = "Only the creator can resubmit"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not validation-rejected"),
        (status = 500, description = "Failed to update request")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn resubmit_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i32>,
    Json(payload): Json<ResubmitRequest>,
) -> Result<ApiResponse<Request>, ApiResponse<()>> {
    let user_id = claims.user_id()?;
    let request = get_request_by_id(&pool, request_id).await?;
    if request.created_by != user_id {
        return Err(ApiResponse::<()>::error(
            StatusCode::FORBIDDEN,
            "Only the creator can resubmit a request",
            None,
        ));
    }

    let transition = lifecycle::resubmit(&request, payload.title, payload.description)
        .map_err(ApiResponse::from_lifecycle_error)?;
    let updated = apply_patch(&pool, request_id, transition.patch)
        .await
        .map_err(|e| store_error(e, "Failed to update request"))?;

    audit::record_action(&pool, user_id, AuditAction::Resubmit, Some(&request), &updated).await;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Request resubmitted",
        updated,
    ))
}

use utoipa::OpenApi;

use crate::db::models::request::{
    FinalStatus, GradeType, RequestStatus, RequestType, ValidationStatus,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        create_request,
        list_requests,
        get_request_handler,
        validate_request,
        process_request,
        treat_request,
        resubmit_request
    ),
    components(schemas(
        Request,
        NewRequest,
        ValidationDecision,
        TreatmentDecision,
        ResubmitRequest,
        ReviewOutcome,
        RequestType,
        GradeType,
        RequestStatus,
        ValidationStatus,
        FinalStatus
    )),
    tags(
        (name = "Requests", description = "Endpoints for the academic request lifecycle")
    )
)]
pub struct RequestDoc;
