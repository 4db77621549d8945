// src/db/queries/user.rs
use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, QueryBuilder};
use utoipa::IntoParams;

use crate::api::auth::Claims;
use crate::db::models::request::GradeType;
use crate::db::models::user::UserSummary;
use crate::lifecycle::handler_role_for;
use crate::utils::api_response::ApiResponse;

#[derive(Debug, Deserialize, IntoParams)]
pub struct HandlerQuery {
    pub grade_type: GradeType,
}

/// Routing candidates for a grade inquiry: teachers for CC issues,
/// department heads for SN issues, scoped to the requester's academic
/// program when one is known.
#[utoipa::path(
    get,
    path = "/users/handlers",
    params(HandlerQuery),
    responses(
        (status = 200, description = "Routing candidates", body = Vec<UserSummary>),
        (status = 500, description = "Failed to retrieve handlers")
    ),
    tag = "Users",
    security(("bearerAuth" = []))
)]
pub async fn list_handlers(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HandlerQuery>,
) -> Result<ApiResponse<Vec<UserSummary>>, ApiResponse<()>> {
    let role = handler_role_for(query.grade_type);

    let mut qb = QueryBuilder::new(
        "SELECT id, username, full_name, role, program FROM users \
         WHERE account_locked = FALSE AND role = ",
    );
    qb.push_bind(role);

    if let Some(program) = &claims.program {
        qb.push(" AND program = ").push_bind(program);
    }

    qb.push(" ORDER BY full_name NULLS LAST, username");

    let handlers = qb
        .build_query_as::<UserSummary>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve handlers",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Routing candidates",
        handlers,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(list_handlers),
    components(schemas(UserSummary)),
    tags(
        (name = "Users", description = "User lookups for request routing")
    )
)]
pub struct UserDoc;
