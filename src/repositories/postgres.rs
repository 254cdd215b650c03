use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{AttemptRepository, QuizRepository};
use crate::error::{Error, Result};
use crate::models::activity::Activity;
use crate::models::answer::Answer;
use crate::models::attempt::Attempt;
use crate::models::question::Question;
use crate::models::quiz::{NegativeMarking, Quiz, ResultVisibilitySettings};

#[derive(Debug, FromRow)]
struct QuizRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    timing_mode: String,
    duration_minutes: Option<i32>,
    questions: Json<Vec<Question>>,
    negative_marking_enabled: bool,
    negative_marking_penalty: Decimal,
    result_visibility: Json<ResultVisibilitySettings>,
    show_results_immediately: bool,
    activated_users: Vec<Uuid>,
    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = Error;

    fn try_from(row: QuizRow) -> Result<Self> {
        Ok(Quiz {
            id: row.id,
            title: row.title,
            description: row.description,
            timing_mode: row.timing_mode.parse()?,
            duration: row.duration_minutes.map(i64::from),
            questions: row.questions.0,
            negative_marking: NegativeMarking {
                enabled: row.negative_marking_enabled,
                penalty_value: row.negative_marking_penalty,
            },
            result_visibility: row.result_visibility.0,
            show_results_immediately: row.show_results_immediately,
            activated_users: row.activated_users,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgQuizRepository {
    pool: PgPool,
}

impl PgQuizRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizRepository for PgQuizRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query_as::<_, QuizRow>(r#"SELECT * FROM quizzes WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Quiz::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Quiz>> {
        let rows = sqlx::query_as::<_, QuizRow>(r#"SELECT * FROM quizzes ORDER BY created_at ASC"#)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Quiz::try_from).collect()
    }

    async fn save(&self, quiz: &Quiz) -> Result<()> {
        let duration = quiz
            .duration
            .map(i32::try_from)
            .transpose()
            .map_err(|_| Error::InvalidInput("duration is out of range".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO quizzes (
                id, title, description, timing_mode, duration_minutes, questions,
                negative_marking_enabled, negative_marking_penalty, result_visibility,
                show_results_immediately, activated_users, is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                timing_mode = EXCLUDED.timing_mode,
                duration_minutes = EXCLUDED.duration_minutes,
                questions = EXCLUDED.questions,
                negative_marking_enabled = EXCLUDED.negative_marking_enabled,
                negative_marking_penalty = EXCLUDED.negative_marking_penalty,
                result_visibility = EXCLUDED.result_visibility,
                show_results_immediately = EXCLUDED.show_results_immediately,
                activated_users = EXCLUDED.activated_users,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(quiz.id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.timing_mode.as_str())
        .bind(duration)
        .bind(Json(&quiz.questions))
        .bind(quiz.negative_marking.enabled)
        .bind(quiz.negative_marking.penalty_value)
        .bind(Json(&quiz.result_visibility))
        .bind(quiz.show_results_immediately)
        .bind(&quiz.activated_users)
        .bind(quiz.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    quiz_id: Uuid,
    user_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    timing_mode: String,
    answers: Json<Vec<Answer>>,
    total_score: Decimal,
    max_score: Decimal,
    negative_marking_applied: bool,
    question_start_times: Json<BTreeMap<Uuid, DateTime<Utc>>>,
    question_time_remaining: Json<BTreeMap<Uuid, i64>>,
    timed_out_questions: Json<Vec<Uuid>>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    activities: Json<Vec<Activity>>,
    version: i64,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = Error;

    fn try_from(row: AttemptRow) -> Result<Self> {
        Ok(Attempt {
            id: row.id,
            quiz_id: row.quiz_id,
            user_id: row.user_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            timing_mode: row.timing_mode.parse()?,
            answers: row.answers.0,
            total_score: row.total_score,
            max_score: row.max_score,
            negative_marking_applied: row.negative_marking_applied,
            question_start_times: row.question_start_times.0,
            question_time_remaining: row.question_time_remaining.0,
            timed_out_questions: row.timed_out_questions.0,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            activities: row.activities.0,
            version: row.version,
        })
    }
}

const ATTEMPT_COLUMNS: &str = r#"
    id, quiz_id, user_id, start_time, end_time, status, timing_mode, answers,
    total_score, max_score, negative_marking_applied, question_start_times,
    question_time_remaining, timed_out_questions, reviewed_by, reviewed_at,
    activities, version
"#;

#[derive(Clone)]
pub struct PgAttemptRepository {
    pool: PgPool,
}

impl PgAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, bind: Option<Uuid>) -> Result<Vec<Attempt>> {
        let mut query = sqlx::query_as::<_, AttemptRow>(sql);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Attempt::try_from).collect()
    }
}

#[async_trait]
impl AttemptRepository for PgAttemptRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attempt>> {
        let sql = format!("SELECT {} FROM attempts WHERE id = $1", ATTEMPT_COLUMNS);
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn find_in_progress(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Option<Attempt>> {
        let sql = format!(
            "SELECT {} FROM attempts WHERE user_id = $1 AND quiz_id = $2 AND status = 'in-progress'",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn find_graded_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Attempt>> {
        let sql = format!(
            "SELECT {} FROM attempts WHERE quiz_id = $1 AND status IN ('submitted', 'reviewed') ORDER BY start_time ASC",
            ATTEMPT_COLUMNS
        );
        self.fetch_many(&sql, Some(quiz_id)).await
    }

    async fn find_all_in_progress(&self) -> Result<Vec<Attempt>> {
        let sql = format!(
            "SELECT {} FROM attempts WHERE status = 'in-progress' ORDER BY start_time ASC",
            ATTEMPT_COLUMNS
        );
        self.fetch_many(&sql, None).await
    }

    async fn insert(&self, attempt: &Attempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, quiz_id, user_id, start_time, end_time, status, timing_mode, answers,
                total_score, max_score, negative_marking_applied, question_start_times,
                question_time_remaining, timed_out_questions, reviewed_by, reviewed_at,
                activities, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.quiz_id)
        .bind(attempt.user_id)
        .bind(attempt.start_time)
        .bind(attempt.end_time)
        .bind(attempt.status.as_str())
        .bind(attempt.timing_mode.as_str())
        .bind(Json(&attempt.answers))
        .bind(attempt.total_score)
        .bind(attempt.max_score)
        .bind(attempt.negative_marking_applied)
        .bind(Json(&attempt.question_start_times))
        .bind(Json(&attempt.question_time_remaining))
        .bind(Json(&attempt.timed_out_questions))
        .bind(attempt.reviewed_by)
        .bind(attempt.reviewed_at)
        .bind(Json(&attempt.activities))
        .bind(attempt.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, attempt: &Attempt) -> Result<Attempt> {
        let sql = format!(
            r#"
            UPDATE attempts SET
                end_time = $3, status = $4, answers = $5, total_score = $6,
                negative_marking_applied = $7, question_start_times = $8,
                question_time_remaining = $9, timed_out_questions = $10,
                reviewed_by = $11, reviewed_at = $12, activities = $13,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt.id)
            .bind(attempt.version)
            .bind(attempt.end_time)
            .bind(attempt.status.as_str())
            .bind(Json(&attempt.answers))
            .bind(attempt.total_score)
            .bind(attempt.negative_marking_applied)
            .bind(Json(&attempt.question_start_times))
            .bind(Json(&attempt.question_time_remaining))
            .bind(Json(&attempt.timed_out_questions))
            .bind(attempt.reviewed_by)
            .bind(attempt.reviewed_at)
            .bind(Json(&attempt.activities))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Attempt::try_from(row),
            None => match self.find_by_id(attempt.id).await? {
                Some(_) => Err(Error::Conflict(format!(
                    "attempt {} was modified concurrently",
                    attempt.id
                ))),
                None => Err(Error::NotFound(format!("attempt {} not found", attempt.id))),
            },
        }
    }
}
