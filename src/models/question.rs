use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_QUESTION_TIME_LIMIT_SECS: i64 = 10;
pub const MAX_QUESTION_TIME_LIMIT_SECS: i64 = 3600;
/// Decimal places allowed in points and penalties.
pub const MAX_SCORE_SCALE: u32 = 4;

pub fn exceeds_score_scale(value: Decimal) -> bool {
    value.normalize().scale() > MAX_SCORE_SCALE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub text: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default = "default_points")]
    pub points: Decimal,
    /// Seconds; required for every question of a per-question timed quiz.
    #[serde(default)]
    pub time_limit: Option<i64>,
}

fn default_points() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    SingleSelect,
    MultiSelect,
    FreeText,
}

impl QuestionType {
    pub fn is_auto_graded(self) -> bool {
        !matches!(self, QuestionType::FreeText)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    /// Display hint in percent (0-100); not used for grading.
    #[serde(default)]
    pub probability: Option<u8>,
}

impl Question {
    pub fn correct_option_ids(&self) -> impl Iterator<Item = &str> {
        self.options
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.points < Decimal::ZERO {
            return Err(format!("question {} has negative points", self.id));
        }
        if exceeds_score_scale(self.points) {
            return Err(format!(
                "question {} points allow at most {} decimal places",
                self.id, MAX_SCORE_SCALE
            ));
        }
        if let Some(bad) = self
            .options
            .iter()
            .find(|o| o.probability.map_or(false, |p| p > 100))
        {
            return Err(format!(
                "option '{}' of question {} has a probability above 100",
                bad.id, self.id
            ));
        }
        if let Some(limit) = self.time_limit {
            if !(MIN_QUESTION_TIME_LIMIT_SECS..=MAX_QUESTION_TIME_LIMIT_SECS).contains(&limit) {
                return Err(format!(
                    "question {} time limit must be between {} and {} seconds",
                    self.id, MIN_QUESTION_TIME_LIMIT_SECS, MAX_QUESTION_TIME_LIMIT_SECS
                ));
            }
        }
        Ok(())
    }
}
