use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// Proctoring media is captured and stored elsewhere; the engine only needs to
/// close whatever is still recording when an attempt ends.
#[async_trait]
pub trait RecordingService: Send + Sync {
    /// Moves every `recording` recording of the attempt to `processing`.
    /// Returns how many were moved.
    async fn stop_active_recordings(&self, attempt_id: Uuid) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgRecordingService {
    pool: PgPool,
}

impl PgRecordingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordingService for PgRecordingService {
    async fn stop_active_recordings(&self, attempt_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE recordings
            SET status = 'processing', updated_at = NOW()
            WHERE attempt_id = $1 AND status = 'recording'
            "#,
        )
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
