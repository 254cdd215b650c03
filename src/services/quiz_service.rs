use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::dto::quiz_dto::{RecalculationReport, UpdateNegativeMarkingRequest};
use crate::error::{Error, Result};
use crate::models::quiz::{NegativeMarking, Quiz};
use crate::models::user::Requester;
use crate::repositories::QuizRepository;
use crate::services::access_service::require_admin;
use crate::services::recalculation_service::ScoreRecalculator;

#[derive(Debug, Clone)]
pub struct QuizUpdateOutcome {
    pub quiz: Quiz,
    /// Present when the change touched negative marking and scores were re-derived.
    pub recalculation: Option<RecalculationReport>,
}

#[derive(Clone)]
pub struct QuizService {
    quizzes: Arc<dyn QuizRepository>,
    recalculator: ScoreRecalculator,
}

impl QuizService {
    pub fn new(quizzes: Arc<dyn QuizRepository>, recalculator: ScoreRecalculator) -> Self {
        Self {
            quizzes,
            recalculator,
        }
    }

    pub async fn get_quiz(&self, quiz_id: Uuid) -> Result<Quiz> {
        self.quizzes
            .find_by_id(quiz_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quiz {} not found", quiz_id)))
    }

    /// Creates or replaces a quiz. Changing negative marking on an existing quiz
    /// re-derives every graded attempt's score.
    pub async fn save_quiz(&self, quiz: Quiz, requester: &Requester) -> Result<QuizUpdateOutcome> {
        require_admin(requester)?;
        quiz.validate()?;

        let previous = self.quizzes.find_by_id(quiz.id).await?;
        self.quizzes.save(&quiz).await?;
        tracing::info!(quiz_id = %quiz.id, created = previous.is_none(), "quiz saved");

        let marking_changed = previous
            .map(|p| p.negative_marking != quiz.negative_marking)
            .unwrap_or(false);
        let recalculation = if marking_changed {
            Some(self.recalculator.recalculate(&quiz).await?)
        } else {
            None
        };

        Ok(QuizUpdateOutcome {
            quiz,
            recalculation,
        })
    }

    pub async fn update_negative_marking(
        &self,
        quiz_id: Uuid,
        req: UpdateNegativeMarkingRequest,
        requester: &Requester,
    ) -> Result<QuizUpdateOutcome> {
        req.validate()?;
        require_admin(requester)?;

        let mut quiz = self.get_quiz(quiz_id).await?;
        let settings = NegativeMarking::from(req);
        if quiz.negative_marking == settings {
            return Ok(QuizUpdateOutcome {
                quiz,
                recalculation: None,
            });
        }

        quiz.negative_marking = settings;
        self.quizzes.save(&quiz).await?;
        tracing::info!(
            quiz_id = %quiz.id,
            enabled = settings.enabled,
            penalty = %settings.penalty_value,
            "negative marking updated"
        );

        let report = self.recalculator.recalculate(&quiz).await?;
        Ok(QuizUpdateOutcome {
            quiz,
            recalculation: Some(report),
        })
    }

    /// Manual, idempotent re-run for one quiz.
    pub async fn recalculate_scores(
        &self,
        quiz_id: Uuid,
        requester: &Requester,
    ) -> Result<RecalculationReport> {
        require_admin(requester)?;
        let quiz = self.get_quiz(quiz_id).await?;
        self.recalculator.recalculate(&quiz).await
    }

    /// Re-runs recalculation for every quiz; one quiz failing does not stop the rest.
    pub async fn recalculate_all(&self, requester: &Requester) -> Result<Vec<RecalculationReport>> {
        require_admin(requester)?;
        let quizzes = self.quizzes.find_all().await?;
        let mut reports = Vec::with_capacity(quizzes.len());
        for quiz in quizzes {
            match self.recalculator.recalculate(&quiz).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(quiz_id = %quiz.id, error = ?e, "recalculation failed for quiz");
                }
            }
        }
        Ok(reports)
    }
}
