use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::activity::ActivityKind;
use crate::models::answer::{Answer, AnswerResponse};
use crate::models::attempt::AttemptStatus;
use crate::models::question::QuestionType;
use crate::models::quiz::{Quiz, TimingMode};

/// Wire shape of an answer. Choice questions send `selected_options`, free-text
/// sends `text_answer`; `resolve` turns it into the typed response once.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerSubmission {
    pub question_id: Uuid,
    #[serde(default)]
    pub selected_options: Option<Vec<String>>,
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub text_answer: Option<String>,
}

impl AnswerSubmission {
    pub fn resolve(self, quiz: &Quiz) -> Answer {
        let response = match quiz.question(self.question_id).map(|q| q.question_type) {
            Some(QuestionType::FreeText) => AnswerResponse::Text {
                text_answer: self.text_answer.unwrap_or_default(),
            },
            Some(QuestionType::SingleSelect | QuestionType::MultiSelect) => {
                AnswerResponse::Options {
                    selected_options: self.selected_options.unwrap_or_default(),
                }
            }
            None => match (self.selected_options, self.text_answer) {
                (Some(selected_options), _) => AnswerResponse::Options { selected_options },
                (None, text) => AnswerResponse::Text {
                    text_answer: text.unwrap_or_default(),
                },
            },
        };
        Answer::ungraded(self.question_id, response)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswersRequest {
    #[validate(nested)]
    pub answers: Vec<AnswerSubmission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    /// `None` grades whatever was last autosaved.
    #[validate(nested)]
    pub answers: Option<Vec<AnswerSubmission>>,
    #[serde(default)]
    pub time_expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestionTimeoutRequest {
    pub question_id: Uuid,
    #[validate(nested)]
    pub partial_answer: Option<AnswerSubmission>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckpointRequest {
    pub question_id: Uuid,
    #[validate(range(min = 0))]
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordActivityRequest {
    pub kind: ActivityKind,
    pub question_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManualGradeRequest {
    pub question_id: Uuid,
    pub score: Decimal,
    pub is_correct: Option<bool>,
    #[validate(length(max = 5000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerView {
    pub question_id: Uuid,
    pub response: AnswerResponse,
    pub is_correct: Option<bool>,
    pub score: Option<Decimal>,
    pub negative_score: Option<Decimal>,
    pub feedback: Option<String>,
}

impl From<&Answer> for AnswerView {
    fn from(answer: &Answer) -> Self {
        Self {
            question_id: answer.question_id,
            response: answer.response.clone(),
            is_correct: answer.is_correct,
            score: Some(answer.score),
            negative_score: Some(answer.negative_score),
            feedback: answer.feedback.clone(),
        }
    }
}

/// What leaves the engine for a reader. Score fields are `None` when results
/// are not disclosed to that reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptView {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub status: AttemptStatus,
    pub timing_mode: TimingMode,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_score: Option<Decimal>,
    pub max_score: Decimal,
    pub negative_marking_applied: bool,
    pub answers: Vec<AnswerView>,
    pub timed_out_questions: Vec<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub results_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTiming {
    pub question_id: Uuid,
    pub time_limit: i64,
    pub remaining_time: i64,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingResponse {
    pub timing_mode: TimingMode,
    pub remaining_time: i64,
    pub total_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_time_limits: Option<Vec<QuestionTiming>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpirySweep {
    pub scanned: usize,
    pub expired: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_question_keeps_whatever_shape_was_sent() {
        let quiz: Quiz = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "title": "Empty",
            "description": null,
            "timing_mode": "total",
            "duration": 5,
            "questions": [],
            "negative_marking": { "enabled": false, "penalty_value": "0" },
            "show_results_immediately": false,
            "is_active": true,
            "created_at": null,
            "updated_at": null
        }))
        .unwrap();

        let submission = AnswerSubmission {
            question_id: Uuid::new_v4(),
            selected_options: Some(vec!["A".into()]),
            text_answer: None,
        };
        let answer = submission.resolve(&quiz);
        assert_eq!(answer.response.selected_options(), ["A".to_string()]);
        assert_eq!(answer.is_correct, None);
    }

    #[test]
    fn negative_remaining_checkpoint_fails_validation() {
        let req = CheckpointRequest {
            question_id: Uuid::new_v4(),
            remaining_seconds: -1,
        };
        assert!(req.validate().is_err());
    }
}
