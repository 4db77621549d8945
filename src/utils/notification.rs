use sqlx::PgPool;
use tracing::warn;

use crate::lifecycle::TransitionEvent;

/// Result type for notification operations
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in notification operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Common notification types for system usage
pub mod notification_types {
    pub const REQUEST_ASSIGNED: &str = "request_assigned";
    pub const REQUEST_VALIDATED: &str = "request_validated";
    pub const REQUEST_REJECTED: &str = "request_rejected";
    pub const REQUEST_COMPLETED: &str = "request_completed";
}

/// One row per event, addressed to the affected party. Never wrapped in
/// the caller's transaction: a missed notification is a UX degradation,
/// not a correctness violation.
async fn insert_notification(
    pool: &PgPool,
    user_id: i32,
    request_id: i32,
    notif_type: &str,
    title: String,
    body: String,
) -> NotificationResult<i32> {
    let row: (i32,) = sqlx::query_as(
        r#"
        INSERT INTO notifications (user_id, request_id, notif_type, title, body)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(request_id)
    .bind(notif_type)
    .bind(title)
    .bind(body)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn notify_transition(
    pool: &PgPool,
    request_id: i32,
    request_title: &str,
    event: &TransitionEvent,
) -> NotificationResult<i32> {
    match event {
        TransitionEvent::AssignedToHandler { handler_id } => {
            insert_notification(
                pool,
                *handler_id,
                request_id,
                notification_types::REQUEST_ASSIGNED,
                format!("Nouvelle requête à traiter : {}", request_title),
                format!(
                    "La requête #{} vous a été assignée pour traitement.",
                    request_id
                ),
            )
            .await
        }
        TransitionEvent::ValidationApproved { creator_id } => {
            insert_notification(
                pool,
                *creator_id,
                request_id,
                notification_types::REQUEST_VALIDATED,
                format!("Requête validée : {}", request_title),
                format!(
                    "Votre requête #{} a passé la validation administrative.",
                    request_id
                ),
            )
            .await
        }
        TransitionEvent::ValidationRejected { creator_id, reason } => {
            insert_notification(
                pool,
                *creator_id,
                request_id,
                notification_types::REQUEST_REJECTED,
                format!("Requête rejetée : {}", request_title),
                format!("Votre requête #{} a été rejetée : {}", request_id, reason),
            )
            .await
        }
        TransitionEvent::TreatmentApproved { creator_id } => {
            insert_notification(
                pool,
                *creator_id,
                request_id,
                notification_types::REQUEST_COMPLETED,
                format!("Requête traitée : {}", request_title),
                format!(
                    "Votre requête #{} a été approuvée et clôturée.",
                    request_id
                ),
            )
            .await
        }
        TransitionEvent::TreatmentRejected { creator_id, comment } => {
            insert_notification(
                pool,
                *creator_id,
                request_id,
                notification_types::REQUEST_REJECTED,
                format!("Requête refusée : {}", request_title),
                format!("Votre requête #{} a été refusée : {}", request_id, comment),
            )
            .await
        }
    }
}

/// Fire-and-forget fan-out for lifecycle transitions. Failures are
/// logged and swallowed; the state change has already been persisted and
/// stays reported as successful.
pub async fn dispatch_events(
    pool: &PgPool,
    request_id: i32,
    request_title: &str,
    events: &[TransitionEvent],
) {
    for event in events {
        if let Err(e) = notify_transition(pool, request_id, request_title, event).await {
            warn!(
                request_id,
                ?event,
                "Failed to write notification row: {}", e
            );
        }
    }
}
