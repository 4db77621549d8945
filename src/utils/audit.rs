use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;

use crate::db::models::audit_log::AuditAction;
use crate::db::models::request::Request;

/// Serializes the full row as the before/after snapshot of an audit
/// entry.
pub fn snapshot(request: &Request) -> Value {
    serde_json::to_value(request).unwrap_or(Value::Null)
}

async fn insert_entry(
    pool: &PgPool,
    request_id: i32,
    actor_id: i32,
    action: AuditAction,
    before: Option<Value>,
    after: Option<Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (request_id, actor_id, action, before, after)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(request_id)
    .bind(actor_id)
    .bind(action)
    .bind(before)
    .bind(after)
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only audit write, best-effort like notifications: a failed
/// insert is logged and swallowed, never rolled into the state change.
pub async fn record_action(
    pool: &PgPool,
    actor_id: i32,
    action: AuditAction,
    before: Option<&Request>,
    after: &Request,
) {
    if let Err(e) = insert_entry(
        pool,
        after.id,
        actor_id,
        action,
        before.map(snapshot),
        Some(snapshot(after)),
    )
    .await
    {
        warn!(
            request_id = after.id,
            action = action.as_str(),
            "Failed to write audit log entry: {}",
            e
        );
    }
}
