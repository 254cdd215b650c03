use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::activity::Activity;

/// Sink for attempt events outside the attempt document itself.
#[async_trait]
pub trait ActivityLogger: Send + Sync {
    async fn record(&self, attempt_id: Uuid, activity: &Activity) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivityLogger;

#[async_trait]
impl ActivityLogger for TracingActivityLogger {
    async fn record(&self, attempt_id: Uuid, activity: &Activity) -> Result<()> {
        tracing::info!(
            target: "attempt_activity",
            attempt_id = %attempt_id,
            kind = activity.kind.as_str(),
            question_id = ?activity.question_id,
            actor = ?activity.actor,
            at = %activity.at,
            "activity"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgActivityLogger {
    pool: PgPool,
}

impl PgActivityLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLogger for PgActivityLogger {
    async fn record(&self, attempt_id: Uuid, activity: &Activity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attempt_activity_log (attempt_id, kind, question_id, actor, details, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt_id)
        .bind(activity.kind.as_str())
        .bind(activity.question_id)
        .bind(activity.actor)
        .bind(&activity.details)
        .bind(activity.at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Logging must never fail the operation that produced the event.
pub(crate) async fn record_quietly(logger: &dyn ActivityLogger, attempt_id: Uuid, activity: &Activity) {
    if let Err(e) = logger.record(attempt_id, activity).await {
        tracing::warn!(attempt_id = %attempt_id, error = ?e, "failed to record activity");
    }
}
