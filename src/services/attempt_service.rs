use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{
    AttemptView, CheckpointRequest, ExpirySweep, ManualGradeRequest, QuestionTimeoutRequest,
    RecordActivityRequest, SaveAnswersRequest, SubmitAttemptRequest, TimingResponse,
};
use crate::error::{Error, Result};
use crate::models::activity::{Activity, ActivityKind};
use crate::models::answer::Answer;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::quiz::{Quiz, TimingMode};
use crate::models::user::Requester;
use crate::repositories::{AttemptRepository, QuizRepository};
use crate::services::access_service::{require_admin, Authorizer};
use crate::services::activity_service::{record_quietly, ActivityLogger};
use crate::services::grading_service::AnswerGrader;
use crate::services::recording_service::RecordingService;
use crate::services::timing_service::TimingPolicy;
use crate::services::visibility_service::ResultVisibilityGate;
use crate::services::Collaborators;
use crate::utils::time::Clock;

/// How long past the budget client writes are still accepted.
pub const LATE_WRITE_GRACE_SECS: i64 = 60;

#[derive(Clone)]
pub struct AttemptService {
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    recordings: Arc<dyn RecordingService>,
    authorizer: Arc<dyn Authorizer>,
    activity: Arc<dyn ActivityLogger>,
    clock: Arc<dyn Clock>,
}

impl AttemptService {
    pub fn new(
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            quizzes,
            attempts,
            recordings: collaborators.recordings,
            authorizer: collaborators.authorizer,
            activity: collaborators.activity,
            clock: collaborators.clock,
        }
    }

    async fn load_quiz(&self, quiz_id: Uuid) -> Result<Quiz> {
        self.quizzes
            .find_by_id(quiz_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("quiz {} not found", quiz_id)))
    }

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attempt {} not found", attempt_id)))
    }

    /// Someone else's attempt is reported as missing, not forbidden.
    async fn load_owned(&self, attempt_id: Uuid, requester: &Requester) -> Result<Attempt> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.user_id != requester.user_id {
            return Err(Error::NotFound(format!("attempt {} not found", attempt_id)));
        }
        Ok(attempt)
    }

    async fn load_readable(&self, attempt_id: Uuid, requester: &Requester) -> Result<Attempt> {
        if requester.is_admin() {
            self.load_attempt(attempt_id).await
        } else {
            self.load_owned(attempt_id, requester).await
        }
    }

    async fn persist(&self, attempt: Attempt, activity: Option<&Activity>) -> Result<Attempt> {
        let saved = self.attempts.save(&attempt).await?;
        if let Some(activity) = activity {
            record_quietly(self.activity.as_ref(), saved.id, activity).await;
        }
        Ok(saved)
    }

    async fn stop_recordings(&self, attempt_id: Uuid) {
        match self.recordings.stop_active_recordings(attempt_id).await {
            Ok(0) => {}
            Ok(stopped) => {
                tracing::info!(attempt_id = %attempt_id, stopped, "active recordings moved to processing")
            }
            Err(e) => {
                tracing::warn!(attempt_id = %attempt_id, error = ?e, "failed to stop active recordings")
            }
        }
    }

    pub async fn start(&self, quiz_id: Uuid, requester: &Requester) -> Result<Attempt> {
        let quiz = self.load_quiz(quiz_id).await?;
        let access = self.authorizer.access(requester, &quiz).await?;
        access.can_attempt(&quiz)?;
        quiz.validate()?;

        if let Some(existing) = self
            .attempts
            .find_in_progress(requester.user_id, quiz.id)
            .await?
        {
            let existing = self
                .expire_if_overrun(existing, &quiz, LATE_WRITE_GRACE_SECS)
                .await?;
            if existing.status == AttemptStatus::InProgress {
                return Err(Error::Conflict(format!(
                    "attempt {} is already in progress for this quiz",
                    existing.id
                )));
            }
        }

        let now = self.clock.now();
        let activity = Activity::new(ActivityKind::AttemptStarted, now)
            .by(requester.user_id)
            .with_details(json!({
                "timing_mode": quiz.timing_mode,
                "max_score": quiz.max_score(),
            }));
        let attempt = Attempt::begin(&quiz, requester.user_id, now).with_activity(activity.clone());

        self.attempts.insert(&attempt).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            quiz_id = %quiz.id,
            user_id = %requester.user_id,
            timing_mode = quiz.timing_mode.as_str(),
            "attempt started"
        );
        record_quietly(self.activity.as_ref(), attempt.id, &activity).await;
        Ok(attempt)
    }

    /// The resume path's state transition: an in-progress attempt whose time has
    /// run out is moved to `expired` and persisted right here, before the caller
    /// gets to look at it. Other reads, `start` and the reaper only expire once
    /// `LATE_WRITE_GRACE_SECS` has also passed.
    pub async fn check_and_expire(&self, attempt: Attempt, quiz: &Quiz) -> Result<Attempt> {
        self.expire_if_overrun(attempt, quiz, 0).await
    }

    async fn expire_if_overrun(&self, attempt: Attempt, quiz: &Quiz, grace_secs: i64) -> Result<Attempt> {
        if attempt.status != AttemptStatus::InProgress {
            return Ok(attempt);
        }
        let now = self.clock.now();
        if !TimingPolicy::is_expired(&attempt, quiz, now)
            || TimingPolicy::overrun(&attempt, quiz, now) < grace_secs
        {
            return Ok(attempt);
        }

        let activity = Activity::new(ActivityKind::Expired, now).with_details(json!({
            "elapsed": TimingPolicy::elapsed_time(&attempt, now),
            "total_time": TimingPolicy::total_time(&attempt, quiz),
        }));
        let expired = attempt.expire(now).with_activity(activity.clone());
        let saved = self.persist(expired, Some(&activity)).await?;
        tracing::warn!(attempt_id = %saved.id, quiz_id = %quiz.id, "attempt expired");
        self.stop_recordings(saved.id).await;
        Ok(saved)
    }

    /// Loads the requester's attempt and makes sure it can still take writes.
    async fn writable(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        grace_secs: i64,
    ) -> Result<(Attempt, Quiz)> {
        let attempt = self.load_owned(attempt_id, requester).await?;
        if attempt.status == AttemptStatus::Expired {
            return Err(Error::Expired(format!("attempt {} has run out of time", attempt.id)));
        }
        attempt.ensure_status(&[AttemptStatus::InProgress])?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;
        let attempt = self.expire_if_overrun(attempt, &quiz, grace_secs).await?;
        if attempt.status == AttemptStatus::Expired {
            return Err(Error::Expired(format!("attempt {} has run out of time", attempt.id)));
        }
        Ok((attempt, quiz))
    }

    pub async fn resume(&self, attempt_id: Uuid, requester: &Requester) -> Result<Attempt> {
        let attempt = self.load_owned(attempt_id, requester).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(Error::NotFound(format!(
                "no in-progress attempt {} to resume",
                attempt_id
            )));
        }
        let quiz = self.load_quiz(attempt.quiz_id).await?;
        let attempt = self.check_and_expire(attempt, &quiz).await?;
        if attempt.status == AttemptStatus::Expired {
            return Err(Error::Expired(format!("attempt {} has run out of time", attempt.id)));
        }
        tracing::info!(attempt_id = %attempt.id, "attempt resumed");
        Ok(attempt)
    }

    /// Autosave. Replaces the whole answer set and never grades.
    pub async fn save_answers(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        req: SaveAnswersRequest,
    ) -> Result<Attempt> {
        req.validate()?;
        let (attempt, quiz) = self
            .writable(attempt_id, requester, LATE_WRITE_GRACE_SECS)
            .await?;

        let incoming: Vec<Answer> = req.answers.into_iter().map(|s| s.resolve(&quiz)).collect();
        let answers = merge_respecting_timeouts(&attempt, incoming);
        let count = answers.len();

        let activity = Activity::new(ActivityKind::AnswersSaved, self.clock.now())
            .by(requester.user_id)
            .with_details(json!({ "count": count }));
        let next = attempt.with_answers(answers).with_activity(activity.clone());
        let saved = self.persist(next, Some(&activity)).await?;
        tracing::debug!(attempt_id = %saved.id, count, "answers autosaved");
        Ok(saved)
    }

    pub async fn submit(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        req: SubmitAttemptRequest,
    ) -> Result<AttemptView> {
        req.validate()?;
        let (attempt, quiz) = self
            .writable(attempt_id, requester, LATE_WRITE_GRACE_SECS)
            .await?;

        let answers = match req.answers {
            Some(submitted) => {
                let incoming = submitted.into_iter().map(|s| s.resolve(&quiz)).collect();
                merge_respecting_timeouts(&attempt, incoming)
            }
            None => attempt.answers.clone(),
        };

        let (status, kind) = if req.time_expired {
            (AttemptStatus::TimeUp, ActivityKind::TimeUp)
        } else {
            (AttemptStatus::Submitted, ActivityKind::Submitted)
        };
        let now = self.clock.now();
        let activity = Activity::new(kind, now).by(requester.user_id);
        let saved = self
            .finish(attempt, &quiz, answers, status, activity, now)
            .await?;
        Ok(ResultVisibilityGate::view(&saved, &quiz, requester))
    }

    /// Grades against the live quiz, closes the attempt and stops its recordings.
    async fn finish(
        &self,
        attempt: Attempt,
        quiz: &Quiz,
        answers: Vec<Answer>,
        status: AttemptStatus,
        activity: Activity,
        now: DateTime<Utc>,
    ) -> Result<Attempt> {
        let graded = AnswerGrader::grade_all(answers, quiz);
        let closed = attempt
            .finish(status, graded, quiz.negative_marking.enabled, now)
            .with_activity(activity.clone());
        let saved = self.persist(closed, Some(&activity)).await?;
        tracing::info!(
            attempt_id = %saved.id,
            quiz_id = %quiz.id,
            status = %saved.status,
            total_score = %saved.total_score,
            max_score = %saved.max_score,
            negative_marking = saved.negative_marking_applied,
            "attempt finished"
        );
        self.stop_recordings(saved.id).await;
        Ok(saved)
    }

    pub async fn handle_question_timeout(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        req: QuestionTimeoutRequest,
    ) -> Result<Attempt> {
        req.validate()?;
        let (attempt, quiz) = self
            .writable(attempt_id, requester, LATE_WRITE_GRACE_SECS)
            .await?;
        require_per_question(&attempt)?;

        let question_id = req.question_id;
        if quiz.question(question_id).is_none() {
            return Err(Error::NotFound(format!("question {} not found", question_id)));
        }
        if attempt.is_question_timed_out(question_id) {
            return Ok(attempt);
        }

        let mut next = attempt;
        if let Some(partial) = req.partial_answer {
            if partial.question_id != question_id {
                return Err(Error::InvalidInput(
                    "partial answer belongs to a different question".to_string(),
                ));
            }
            next = next.upsert_answer(partial.resolve(&quiz));
        }

        let activity = Activity::new(ActivityKind::QuestionTimedOut, self.clock.now())
            .for_question(question_id)
            .by(requester.user_id);
        let next = next
            .mark_question_timed_out(question_id)
            .with_activity(activity.clone());
        let saved = self.persist(next, Some(&activity)).await?;
        tracing::info!(attempt_id = %saved.id, question_id = %question_id, "question timed out");
        Ok(saved)
    }

    /// Anchors a question's countdown the first time it is shown.
    pub async fn start_question(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        question_id: Uuid,
    ) -> Result<Attempt> {
        let (attempt, quiz) = self.writable(attempt_id, requester, 0).await?;
        require_per_question(&attempt)?;
        if quiz.question(question_id).is_none() {
            return Err(Error::NotFound(format!("question {} not found", question_id)));
        }
        if attempt.question_start_times.contains_key(&question_id) {
            return Ok(attempt);
        }

        let now = self.clock.now();
        let activity = Activity::new(ActivityKind::QuestionStarted, now).for_question(question_id);
        let next = attempt
            .start_question(question_id, now)
            .with_activity(activity.clone());
        self.persist(next, Some(&activity)).await
    }

    /// Stores the client's countdown for a question. Checkpoints only ever lower it.
    pub async fn checkpoint_question_time(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        req: CheckpointRequest,
    ) -> Result<Attempt> {
        req.validate()?;
        let (attempt, quiz) = self.writable(attempt_id, requester, 0).await?;
        require_per_question(&attempt)?;

        let question = quiz
            .question(req.question_id)
            .ok_or_else(|| Error::NotFound(format!("question {} not found", req.question_id)))?;
        if !attempt.question_start_times.contains_key(&question.id) {
            return Err(Error::InvalidInput(format!(
                "question {} has not been started",
                question.id
            )));
        }

        let limit = TimingPolicy::question_limit(question);
        let mut remaining = req.remaining_seconds.clamp(0, limit);
        if let Some(previous) = attempt.question_time_remaining.get(&question.id) {
            remaining = remaining.min(*previous);
        }
        let next = attempt.checkpoint_question(question.id, remaining);
        self.persist(next, None).await
    }

    /// Proctoring signals reported by the client (tab switches, lost camera, ...).
    pub async fn record_activity(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        req: RecordActivityRequest,
    ) -> Result<Attempt> {
        req.validate()?;
        if !req.kind.is_client_reportable() {
            return Err(Error::InvalidInput(format!(
                "activity '{}' cannot be reported by a client",
                req.kind.as_str()
            )));
        }
        let (attempt, _quiz) = self
            .writable(attempt_id, requester, LATE_WRITE_GRACE_SECS)
            .await?;

        let mut activity = Activity::new(req.kind, self.clock.now()).by(requester.user_id);
        activity.question_id = req.question_id;
        activity.details = req.details;

        let saved = self
            .persist(attempt.with_activity(activity.clone()), Some(&activity))
            .await?;
        tracing::warn!(
            attempt_id = %saved.id,
            kind = req.kind.as_str(),
            "proctoring event recorded"
        );
        Ok(saved)
    }

    pub async fn get_attempt(&self, attempt_id: Uuid, requester: &Requester) -> Result<AttemptView> {
        let attempt = self.load_readable(attempt_id, requester).await?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;
        let attempt = self
            .expire_if_overrun(attempt, &quiz, LATE_WRITE_GRACE_SECS)
            .await?;
        Ok(ResultVisibilityGate::view(&attempt, &quiz, requester))
    }

    pub async fn timing_info(&self, attempt_id: Uuid, requester: &Requester) -> Result<TimingResponse> {
        let attempt = self.load_readable(attempt_id, requester).await?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;
        let attempt = self
            .expire_if_overrun(attempt, &quiz, LATE_WRITE_GRACE_SECS)
            .await?;
        Ok(TimingPolicy::timing_info(&attempt, &quiz, self.clock.now()))
    }

    pub async fn grade_answer_manually(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        req: ManualGradeRequest,
    ) -> Result<AttemptView> {
        req.validate()?;
        require_admin(requester)?;

        let attempt = self.load_attempt(attempt_id).await?;
        attempt.ensure_status(&[
            AttemptStatus::Submitted,
            AttemptStatus::TimeUp,
            AttemptStatus::Reviewed,
        ])?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;
        let question = quiz
            .question(req.question_id)
            .ok_or_else(|| Error::NotFound(format!("question {} not found", req.question_id)))?;
        if req.score < rust_decimal::Decimal::ZERO || req.score > question.points {
            return Err(Error::InvalidInput(format!(
                "score must be between 0 and {}",
                question.points
            )));
        }
        let existing = attempt.answer(question.id).cloned().ok_or_else(|| {
            Error::NotFound(format!("no answer for question {} in attempt", question.id))
        })?;

        let is_correct = req.is_correct.or(Some(req.score == question.points));
        let negative_score = if attempt.negative_marking_applied {
            AnswerGrader::penalty_for(question.question_type, is_correct, &quiz.negative_marking)
        } else {
            rust_decimal::Decimal::ZERO
        };
        let graded = Answer {
            is_correct,
            score: req.score,
            negative_score,
            feedback: req.feedback,
            ..existing
        };

        let activity = Activity::new(ActivityKind::ManuallyGraded, self.clock.now())
            .for_question(question.id)
            .by(requester.user_id)
            .with_details(json!({ "score": req.score, "is_correct": is_correct }));
        let next = attempt
            .upsert_answer(graded)
            .rescore()
            .with_activity(activity.clone());
        let saved = self.persist(next, Some(&activity)).await?;
        tracing::info!(
            attempt_id = %saved.id,
            question_id = %question.id,
            total_score = %saved.total_score,
            "answer graded manually"
        );
        Ok(ResultVisibilityGate::view(&saved, &quiz, requester))
    }

    pub async fn mark_reviewed(&self, attempt_id: Uuid, requester: &Requester) -> Result<AttemptView> {
        require_admin(requester)?;
        let attempt = self.load_attempt(attempt_id).await?;
        attempt.ensure_status(&[AttemptStatus::Submitted, AttemptStatus::TimeUp])?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;

        let now = self.clock.now();
        let activity = Activity::new(ActivityKind::Reviewed, now).by(requester.user_id);
        let next = attempt
            .mark_reviewed(requester.user_id, now)
            .with_activity(activity.clone());
        let saved = self.persist(next, Some(&activity)).await?;
        tracing::info!(attempt_id = %saved.id, reviewer = %requester.user_id, "attempt reviewed");
        Ok(ResultVisibilityGate::view(&saved, &quiz, requester))
    }

    pub async fn unreview(&self, attempt_id: Uuid, requester: &Requester) -> Result<AttemptView> {
        require_admin(requester)?;
        let attempt = self.load_attempt(attempt_id).await?;
        attempt.ensure_status(&[AttemptStatus::Reviewed])?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;

        let activity = Activity::new(ActivityKind::Unreviewed, self.clock.now()).by(requester.user_id);
        let next = attempt.unreview().with_activity(activity.clone());
        let saved = self.persist(next, Some(&activity)).await?;
        tracing::info!(attempt_id = %saved.id, "attempt moved back to submitted");
        Ok(ResultVisibilityGate::view(&saved, &quiz, requester))
    }

    /// Admin force-finish: grades whatever was autosaved and closes the attempt.
    pub async fn terminate(
        &self,
        attempt_id: Uuid,
        requester: &Requester,
        reason: &str,
    ) -> Result<AttemptView> {
        require_admin(requester)?;
        let attempt = self.load_attempt(attempt_id).await?;
        attempt.ensure_status(&[AttemptStatus::InProgress])?;
        let quiz = self.load_quiz(attempt.quiz_id).await?;

        let now = self.clock.now();
        let activity = Activity::new(ActivityKind::Terminated, now)
            .by(requester.user_id)
            .with_details(json!({ "reason": reason }));
        let answers = attempt.answers.clone();
        let saved = self
            .finish(attempt, &quiz, answers, AttemptStatus::Submitted, activity, now)
            .await?;
        tracing::warn!(attempt_id = %saved.id, admin = %requester.user_id, reason, "attempt terminated");
        Ok(ResultVisibilityGate::view(&saved, &quiz, requester))
    }

    /// Reaper sweep over every in-progress attempt past its budget and the late
    /// write grace. Individual failures are counted and skipped.
    pub async fn expire_stale_attempts(&self) -> Result<ExpirySweep> {
        let in_progress = self.attempts.find_all_in_progress().await?;
        let mut quizzes: HashMap<Uuid, Quiz> = HashMap::new();
        let mut sweep = ExpirySweep::default();

        for attempt in in_progress {
            sweep.scanned += 1;
            let attempt_id = attempt.id;
            let quiz = match quizzes.get(&attempt.quiz_id) {
                Some(quiz) => quiz.clone(),
                None => match self.load_quiz(attempt.quiz_id).await {
                    Ok(quiz) => {
                        quizzes.insert(quiz.id, quiz.clone());
                        quiz
                    }
                    Err(e) => {
                        tracing::error!(attempt_id = %attempt_id, error = ?e, "cannot load quiz for attempt");
                        sweep.failed += 1;
                        continue;
                    }
                },
            };

            match self
                .expire_if_overrun(attempt, &quiz, LATE_WRITE_GRACE_SECS)
                .await
            {
                Ok(a) if a.status == AttemptStatus::Expired => sweep.expired += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(attempt_id = %attempt_id, error = ?e, "failed to expire attempt");
                    sweep.failed += 1;
                }
            }
        }

        if sweep.expired > 0 || sweep.failed > 0 {
            tracing::info!(
                scanned = sweep.scanned,
                expired = sweep.expired,
                failed = sweep.failed,
                "expiry sweep finished"
            );
        }
        Ok(sweep)
    }
}

fn require_per_question(attempt: &Attempt) -> Result<()> {
    if attempt.timing_mode == TimingMode::PerQuestion {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "operation only applies to per-question timed attempts".to_string(),
        ))
    }
}

/// Later duplicates win; answers to timed-out questions stay as they were.
fn merge_respecting_timeouts(attempt: &Attempt, incoming: Vec<Answer>) -> Vec<Answer> {
    let mut merged: Vec<Answer> = Vec::with_capacity(incoming.len());
    for answer in incoming {
        if attempt.is_question_timed_out(answer.question_id) {
            continue;
        }
        match merged.iter_mut().find(|a| a.question_id == answer.question_id) {
            Some(existing) => *existing = answer,
            None => merged.push(answer),
        }
    }
    merged.extend(
        attempt
            .answers
            .iter()
            .filter(|a| attempt.is_question_timed_out(a.question_id))
            .cloned(),
    );
    merged
}
