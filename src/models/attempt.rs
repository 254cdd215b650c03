use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::activity::Activity;
use super::answer::Answer;
use super::quiz::{Quiz, TimingMode};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "submitted")]
    Submitted,
    #[serde(rename = "reviewed")]
    Reviewed,
    #[serde(rename = "time_up")]
    TimeUp,
    #[serde(rename = "expired")]
    Expired,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Reviewed => "reviewed",
            AttemptStatus::TimeUp => "time_up",
            AttemptStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }

    /// Statuses whose answers carry a grading result.
    pub fn is_graded(self) -> bool {
        matches!(
            self,
            AttemptStatus::Submitted | AttemptStatus::Reviewed | AttemptStatus::TimeUp
        )
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-progress" => Ok(AttemptStatus::InProgress),
            "submitted" => Ok(AttemptStatus::Submitted),
            "reviewed" => Ok(AttemptStatus::Reviewed),
            "time_up" => Ok(AttemptStatus::TimeUp),
            "expired" => Ok(AttemptStatus::Expired),
            other => Err(Error::Internal(format!("unknown attempt status '{}'", other))),
        }
    }
}

/// One user's run through a quiz. Transitions consume the value and hand back
/// the next version; the repository persists it against `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub timing_mode: TimingMode,
    pub answers: Vec<Answer>,
    pub total_score: Decimal,
    pub max_score: Decimal,
    pub negative_marking_applied: bool,
    pub question_start_times: BTreeMap<Uuid, DateTime<Utc>>,
    /// Seconds left per question as of the last checkpoint.
    pub question_time_remaining: BTreeMap<Uuid, i64>,
    pub timed_out_questions: Vec<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub activities: Vec<Activity>,
    pub version: i64,
}

impl Attempt {
    pub fn begin(quiz: &Quiz, user_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut question_start_times = BTreeMap::new();
        if quiz.timing_mode == TimingMode::PerQuestion {
            if let Some(first) = quiz.questions.first() {
                question_start_times.insert(first.id, now);
            }
        }

        Self {
            id: Uuid::new_v4(),
            quiz_id: quiz.id,
            user_id,
            start_time: now,
            end_time: None,
            status: AttemptStatus::InProgress,
            timing_mode: quiz.timing_mode,
            answers: Vec::new(),
            total_score: Decimal::ZERO,
            max_score: quiz.max_score(),
            negative_marking_applied: false,
            question_start_times,
            question_time_remaining: BTreeMap::new(),
            timed_out_questions: Vec::new(),
            reviewed_by: None,
            reviewed_at: None,
            activities: Vec::new(),
            version: 0,
        }
    }

    pub fn ensure_status(&self, allowed: &[AttemptStatus]) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(Error::Conflict(format!(
                "attempt {} is {}, expected one of: {}",
                self.id,
                self.status,
                allowed
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }

    pub fn answer(&self, question_id: Uuid) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    pub fn is_question_timed_out(&self, question_id: Uuid) -> bool {
        self.timed_out_questions.contains(&question_id)
    }

    /// `Σscore − Σnegative_score`, deliberately not clamped at zero.
    pub fn computed_total(&self) -> Decimal {
        self.answers.iter().map(Answer::net_score).sum()
    }

    pub fn with_answers(mut self, answers: Vec<Answer>) -> Self {
        self.answers = answers;
        self
    }

    pub fn upsert_answer(mut self, answer: Answer) -> Self {
        match self
            .answers
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            Some(existing) => *existing = answer,
            None => self.answers.push(answer),
        }
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn start_question(mut self, question_id: Uuid, now: DateTime<Utc>) -> Self {
        self.question_start_times.entry(question_id).or_insert(now);
        self
    }

    pub fn checkpoint_question(mut self, question_id: Uuid, remaining: i64) -> Self {
        self.question_time_remaining.insert(question_id, remaining.max(0));
        self
    }

    pub fn mark_question_timed_out(mut self, question_id: Uuid) -> Self {
        if !self.timed_out_questions.contains(&question_id) {
            self.timed_out_questions.push(question_id);
        }
        self.question_time_remaining.insert(question_id, 0);
        self
    }

    pub fn expire(mut self, now: DateTime<Utc>) -> Self {
        self.status = AttemptStatus::Expired;
        self.end_time = Some(now);
        self
    }

    /// Closes an in-progress attempt with already graded answers.
    pub fn finish(
        mut self,
        status: AttemptStatus,
        graded: Vec<Answer>,
        negative_marking_applied: bool,
        now: DateTime<Utc>,
    ) -> Self {
        self.answers = graded;
        self.status = status;
        self.end_time = Some(now);
        self.negative_marking_applied = negative_marking_applied;
        self.total_score = self.computed_total();
        self
    }

    pub fn rescore(mut self) -> Self {
        self.total_score = self.computed_total();
        self
    }

    pub fn mark_reviewed(mut self, reviewer: Uuid, now: DateTime<Utc>) -> Self {
        self.status = AttemptStatus::Reviewed;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self
    }

    pub fn unreview(mut self) -> Self {
        self.status = AttemptStatus::Submitted;
        self.reviewed_by = None;
        self.reviewed_at = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answer::AnswerResponse;

    fn answer(score: i64, negative: Decimal) -> Answer {
        Answer {
            question_id: Uuid::new_v4(),
            response: AnswerResponse::Options {
                selected_options: vec!["A".into()],
            },
            is_correct: Some(score > 0),
            score: Decimal::from(score),
            negative_score: negative,
            feedback: None,
        }
    }

    fn blank_attempt() -> Attempt {
        let quiz = Quiz {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: None,
            timing_mode: TimingMode::Total,
            duration: Some(10),
            questions: Vec::new(),
            negative_marking: Default::default(),
            result_visibility: Default::default(),
            show_results_immediately: false,
            activated_users: Vec::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        };
        Attempt::begin(&quiz, Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn total_is_not_clamped_at_zero() {
        let attempt = blank_attempt().with_answers(vec![
            answer(0, Decimal::ONE),
            answer(0, Decimal::new(5, 1)),
        ]);
        assert_eq!(attempt.computed_total(), Decimal::new(-15, 1));
    }

    #[test]
    fn status_strings_round_trip_through_from_str() {
        for status in [
            AttemptStatus::InProgress,
            AttemptStatus::Submitted,
            AttemptStatus::Reviewed,
            AttemptStatus::TimeUp,
            AttemptStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_value(AttemptStatus::InProgress).unwrap(),
            serde_json::json!("in-progress")
        );
    }

    #[test]
    fn timing_out_a_question_twice_records_it_once() {
        let qid = Uuid::new_v4();
        let attempt = blank_attempt()
            .mark_question_timed_out(qid)
            .mark_question_timed_out(qid);
        assert_eq!(attempt.timed_out_questions, vec![qid]);
        assert_eq!(attempt.question_time_remaining.get(&qid), Some(&0));
    }

    #[test]
    fn ensure_status_rejects_with_conflict() {
        let attempt = blank_attempt();
        let err = attempt
            .ensure_status(&[AttemptStatus::Submitted])
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
