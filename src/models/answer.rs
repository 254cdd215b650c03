use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the user actually entered, already resolved against the question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerResponse {
    Options { selected_options: Vec<String> },
    Text { text_answer: String },
}

impl AnswerResponse {
    pub fn selected_options(&self) -> &[String] {
        match self {
            AnswerResponse::Options { selected_options } => selected_options,
            AnswerResponse::Text { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: Uuid,
    pub response: AnswerResponse,
    /// `None` means ungraded or waiting for manual review.
    pub is_correct: Option<bool>,
    pub score: Decimal,
    pub negative_score: Decimal,
    pub feedback: Option<String>,
}

impl Answer {
    pub fn ungraded(question_id: Uuid, response: AnswerResponse) -> Self {
        Self {
            question_id,
            response,
            is_correct: None,
            score: Decimal::ZERO,
            negative_score: Decimal::ZERO,
            feedback: None,
        }
    }

    pub fn net_score(&self) -> Decimal {
        self.score - self.negative_score
    }
}
