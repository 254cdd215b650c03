use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::question::{exceeds_score_scale, Question, QuestionType, MAX_SCORE_SCALE};
use crate::error::{Error, Result};

pub const MIN_DURATION_MINUTES: i64 = 1;
pub const MAX_DURATION_MINUTES: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingMode {
    Total,
    PerQuestion,
}

impl TimingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TimingMode::Total => "total",
            TimingMode::PerQuestion => "per-question",
        }
    }
}

impl std::str::FromStr for TimingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "total" => Ok(TimingMode::Total),
            "per-question" => Ok(TimingMode::PerQuestion),
            other => Err(Error::Internal(format!("unknown timing mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeMarking {
    pub enabled: bool,
    pub penalty_value: Decimal,
}

impl Default for NegativeMarking {
    fn default() -> Self {
        Self {
            enabled: false,
            penalty_value: Decimal::ZERO,
        }
    }
}

/// What a non-admin sees once results are disclosed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultVisibilitySettings {
    pub show_score: bool,
    pub show_correctness: bool,
    pub show_feedback: bool,
}

impl Default for ResultVisibilitySettings {
    fn default() -> Self {
        Self {
            show_score: true,
            show_correctness: true,
            show_feedback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub timing_mode: TimingMode,
    /// Minutes; required when `timing_mode` is `Total`.
    pub duration: Option<i64>,
    pub questions: Vec<Question>,
    pub negative_marking: NegativeMarking,
    #[serde(default)]
    pub result_visibility: ResultVisibilitySettings,
    pub show_results_immediately: bool,
    #[serde(default)]
    pub activated_users: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Quiz {
    pub fn question(&self, question_id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn max_score(&self) -> Decimal {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn has_free_text(&self) -> bool {
        self.questions
            .iter()
            .any(|q| q.question_type == QuestionType::FreeText)
    }

    pub fn is_user_activated(&self, user_id: Uuid) -> bool {
        self.activated_users.contains(&user_id)
    }

    /// Checks the timing and grading invariants a quiz must hold before attempts run against it.
    pub fn validate(&self) -> Result<()> {
        match self.timing_mode {
            TimingMode::Total => match self.duration {
                Some(d) if (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&d) => {}
                Some(_) => {
                    return Err(Error::InvalidInput(format!(
                        "duration must be between {} and {} minutes",
                        MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
                    )))
                }
                None => {
                    return Err(Error::InvalidInput(
                        "duration is required for total timing".to_string(),
                    ))
                }
            },
            TimingMode::PerQuestion => {
                if let Some(q) = self.questions.iter().find(|q| q.time_limit.is_none()) {
                    return Err(Error::InvalidInput(format!(
                        "question {} needs a time limit for per-question timing",
                        q.id
                    )));
                }
            }
        }

        if self.negative_marking.penalty_value < Decimal::ZERO {
            return Err(Error::InvalidInput(
                "negative marking penalty must not be negative".to_string(),
            ));
        }
        if exceeds_score_scale(self.negative_marking.penalty_value) {
            return Err(Error::InvalidInput(format!(
                "negative marking penalty allows at most {} decimal places",
                MAX_SCORE_SCALE
            )));
        }

        for question in &self.questions {
            question.validate().map_err(Error::InvalidInput)?;
        }
        Ok(())
    }
}
