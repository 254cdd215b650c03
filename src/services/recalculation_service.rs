use std::sync::Arc;

use serde_json::json;

use crate::dto::quiz_dto::{RecalculationFailure, RecalculationReport};
use crate::error::Result;
use crate::models::activity::{Activity, ActivityKind};
use crate::models::answer::Answer;
use crate::models::attempt::Attempt;
use crate::models::quiz::Quiz;
use crate::repositories::AttemptRepository;
use crate::services::activity_service::{record_quietly, ActivityLogger};
use crate::services::grading_service::AnswerGrader;
use crate::utils::time::Clock;

/// Re-derives negative marks after grading rules change. Correctness stored at
/// submission is taken as final; only penalties and totals move.
#[derive(Clone)]
pub struct ScoreRecalculator {
    attempts: Arc<dyn AttemptRepository>,
    activity: Arc<dyn ActivityLogger>,
    clock: Arc<dyn Clock>,
    batch_limit: Option<usize>,
}

impl ScoreRecalculator {
    pub fn new(
        attempts: Arc<dyn AttemptRepository>,
        activity: Arc<dyn ActivityLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attempts,
            activity,
            clock,
            batch_limit: None,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: Option<usize>) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Returns the attempt with penalties and total re-derived from the quiz's
    /// current negative-marking rule.
    pub fn rescore(attempt: &Attempt, quiz: &Quiz) -> Attempt {
        let answers: Vec<Answer> = attempt
            .answers
            .iter()
            .map(|answer| {
                let Some(question) = quiz.question(answer.question_id) else {
                    return answer.clone();
                };
                Answer {
                    negative_score: AnswerGrader::penalty_for(
                        question.question_type,
                        answer.is_correct,
                        &quiz.negative_marking,
                    ),
                    ..answer.clone()
                }
            })
            .collect();

        let mut next = attempt.clone().with_answers(answers).rescore();
        next.negative_marking_applied = quiz.negative_marking.enabled;
        next
    }

    fn score_changed(before: &Attempt, after: &Attempt) -> bool {
        before.total_score != after.total_score
            || before
                .answers
                .iter()
                .zip(&after.answers)
                .any(|(a, b)| a.negative_score != b.negative_score)
    }

    /// Walks every submitted/reviewed attempt of the quiz one by one. A failed
    /// save is recorded in the report and the batch carries on; re-running is safe.
    /// With a batch limit, at most that many stale attempts are written per run
    /// and the rest are counted as deferred for the next run.
    pub async fn recalculate(&self, quiz: &Quiz) -> Result<RecalculationReport> {
        let attempts = self.attempts.find_graded_for_quiz(quiz.id).await?;
        let mut report = RecalculationReport {
            quiz_id: Some(quiz.id),
            ..Default::default()
        };

        for attempt in attempts {
            report.processed += 1;
            let rescored = Self::rescore(&attempt, quiz);
            if !Self::score_changed(&attempt, &rescored) {
                continue;
            }
            let written = report.updated + report.failures.len();
            if self.batch_limit.map_or(false, |limit| written >= limit) {
                report.deferred += 1;
                continue;
            }

            let activity = Activity::new(ActivityKind::ScoreRecalculated, self.clock.now())
                .with_details(json!({
                    "previous_total": attempt.total_score,
                    "new_total": rescored.total_score,
                    "negative_marking_enabled": quiz.negative_marking.enabled,
                    "penalty_value": quiz.negative_marking.penalty_value,
                }));
            let rescored = rescored.with_activity(activity.clone());

            match self.attempts.save(&rescored).await {
                Ok(saved) => {
                    report.updated += 1;
                    tracing::info!(
                        quiz_id = %quiz.id,
                        attempt_id = %saved.id,
                        previous_total = %attempt.total_score,
                        new_total = %saved.total_score,
                        "attempt score recalculated"
                    );
                    record_quietly(self.activity.as_ref(), saved.id, &activity).await;
                }
                Err(e) => {
                    tracing::error!(
                        quiz_id = %quiz.id,
                        attempt_id = %attempt.id,
                        error = ?e,
                        "failed to persist recalculated score"
                    );
                    report.failures.push(RecalculationFailure {
                        attempt_id: attempt.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            quiz_id = %quiz.id,
            processed = report.processed,
            updated = report.updated,
            deferred = report.deferred,
            failed = report.failures.len(),
            "score recalculation finished"
        );
        Ok(report)
    }
}
