use axum::{
    body::Body,
    extract::{Extension, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache; // ✅ High-performance TTL Cache
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::auth::Claims;
use crate::config::Config;
use crate::db::models::request::Request as AcademicRequest;
use crate::db::models::user::roles;
use crate::utils::api_response::ApiResponse;

/// ✅ **Access-context cache using `moka`**
pub type AccessCache = Arc<Cache<i32, UserAccess>>;

/// ✅ **Initialize the `moka` cache**
pub fn create_access_cache() -> AccessCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(600)) // ✅ TTL = 10 minutes
            .build(),
    )
}

/// ✅ **JWT Middleware** (Handles Token Authentication)
pub async fn jwt_middleware(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    // Step 1: Extract Authorization header
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        tracing::error!("Missing Authorization header");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing Authorization header", None)
            .into_response()
    })?;

    // Step 2: Convert header to string
    let token_str = auth_header.to_str().map_err(|_| {
        tracing::error!("Invalid Authorization header format");
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid Authorization header format",
            None,
        )
        .into_response()
    })?;

    // Step 3: Strip "Bearer " prefix
    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::error!("Invalid token format (missing 'Bearer ' prefix)");
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid token format (missing 'Bearer ' prefix)",
            None,
        )
        .into_response()
    })?;

    // Step 4: Decode the JWT token
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(Config::get().jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::error!("JWT decoding failed: {:?}", e);
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid token",
            Some(json!({ "error": e.to_string() })),
        )
        .into_response()
    })?;

    // Step 5: Insert claims into request extensions
    req.extensions_mut().insert(token_data.claims);

    // Step 6: Proceed to the next middleware
    Ok(next.run(req).await)
}

/// ✅ **Per-request access context**
///
/// Replaces the original's process-wide user-role store: role and program
/// travel with the request instead of living in a mutable singleton.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct UserAccess {
    pub user_id: i32,
    pub role: String,
    pub program: Option<String>,
}

impl UserAccess {
    pub fn is_admin(&self) -> bool {
        self.role == roles::ADMIN
    }

    pub fn is_student(&self) -> bool {
        self.role == roles::STUDENT
    }

    /// Teachers and department heads are the two handler roles.
    pub fn is_handler(&self) -> bool {
        self.role == roles::TEACHER || self.role == roles::DEPARTMENT_HEAD
    }

    /// Only administrators operate the validation gate.
    pub fn can_validate(&self) -> bool {
        self.is_admin()
    }

    /// Treatment is reserved to the routed handler of the request.
    pub fn can_treat(&self, request: &AcademicRequest) -> bool {
        self.is_handler() && request.routed_to == Some(self.user_id)
    }

    /// Creator, routed handler, and admins may read a request.
    pub fn can_view(&self, request: &AcademicRequest) -> bool {
        self.is_admin()
            || request.created_by == self.user_id
            || request.routed_to == Some(self.user_id)
    }
}

/// ✅ **Access middleware with `moka`**
pub async fn access_middleware(
    State(db_pool): State<PgPool>,
    Extension(access_cache): Extension<AccessCache>, // ✅ Uses Axum **Extension**
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        error!("Missing JWT claims in request");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing JWT claims in request", None)
            .into_response()
    })?;

    let user_id: i32 = claims.sub.parse().map_err(|_| {
        error!("Invalid user ID format in JWT claims");
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid user ID format in JWT claims",
            None,
        )
        .into_response()
    })?;

    // ✅ **Check cache first before querying DB**
    if let Some(cached_access) = access_cache.get(&user_id) {
        req.extensions_mut().insert(cached_access);
        return Ok(next.run(req).await);
    }

    // ❌ **If not cached, query database**
    let user_access = match fetch_access_from_db(user_id, &db_pool).await {
        Ok(access) => access,
        Err(err) => {
            error!("Database query failed: {:?}", err);
            return Err(ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load user access context",
                Some(json!({ "error": err.to_string() })),
            )
            .into_response());
        }
    };

    // ✅ **Cache the retrieved context**
    access_cache.insert(user_id, user_access.clone());

    // ✅ **Attach to request & continue**
    req.extensions_mut().insert(user_access);
    Ok(next.run(req).await)
}

/// ✅ **Query database for the access context**
async fn fetch_access_from_db(user_id: i32, pool: &PgPool) -> Result<UserAccess, sqlx::Error> {
    sqlx::query_as::<_, UserAccess>(
        r#"
        SELECT id AS user_id, role, program
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}
