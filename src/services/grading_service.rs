use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::models::answer::{Answer, AnswerResponse};
use crate::models::question::{Question, QuestionType};
use crate::models::quiz::{NegativeMarking, Quiz};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeOutcome {
    pub is_correct: Option<bool>,
    pub score: Decimal,
    pub negative_score: Decimal,
}

pub struct AnswerGrader;

impl AnswerGrader {
    pub fn grade(
        response: &AnswerResponse,
        question: &Question,
        negative_marking: &NegativeMarking,
    ) -> GradeOutcome {
        let is_correct = match question.question_type {
            QuestionType::SingleSelect => Some(Self::single_select_correct(response, question)),
            QuestionType::MultiSelect => Some(Self::multi_select_correct(response, question)),
            QuestionType::FreeText => None,
        };

        let score = if is_correct == Some(true) {
            question.points
        } else {
            Decimal::ZERO
        };

        GradeOutcome {
            is_correct,
            score,
            negative_score: Self::penalty_for(question.question_type, is_correct, negative_marking),
        }
    }

    /// Penalty owed for an answer given its stored correctness. Free-text is
    /// always exempt, and ungraded answers owe nothing.
    pub fn penalty_for(
        question_type: QuestionType,
        is_correct: Option<bool>,
        negative_marking: &NegativeMarking,
    ) -> Decimal {
        let penalised = negative_marking.enabled
            && question_type.is_auto_graded()
            && is_correct == Some(false);
        if penalised {
            negative_marking.penalty_value
        } else {
            Decimal::ZERO
        }
    }

    /// Grades one stored answer against the live quiz. Answers that point at an
    /// unknown question come back ungraded instead of failing the submission.
    pub fn grade_answer(answer: Answer, quiz: &Quiz) -> Answer {
        let Some(question) = quiz.question(answer.question_id) else {
            tracing::warn!(
                quiz_id = %quiz.id,
                question_id = %answer.question_id,
                "answer references unknown question, leaving ungraded"
            );
            return Answer::ungraded(answer.question_id, answer.response);
        };

        let outcome = Self::grade(&answer.response, question, &quiz.negative_marking);
        Answer {
            is_correct: outcome.is_correct,
            score: outcome.score,
            negative_score: outcome.negative_score,
            feedback: None,
            ..answer
        }
    }

    pub fn grade_all(answers: Vec<Answer>, quiz: &Quiz) -> Vec<Answer> {
        answers
            .into_iter()
            .map(|a| Self::grade_answer(a, quiz))
            .collect()
    }

    pub fn total_score(answers: &[Answer]) -> Decimal {
        answers.iter().map(Answer::net_score).sum()
    }

    fn single_select_correct(response: &AnswerResponse, question: &Question) -> bool {
        let mut correct = question.correct_option_ids();
        let (Some(correct_id), None) = (correct.next(), correct.next()) else {
            return false;
        };
        matches!(response.selected_options(), [only] if only == correct_id)
    }

    fn multi_select_correct(response: &AnswerResponse, question: &Question) -> bool {
        let selected: BTreeSet<&str> = response
            .selected_options()
            .iter()
            .map(String::as_str)
            .collect();
        let correct: BTreeSet<&str> = question.correct_option_ids().collect();
        selected == correct
    }
}
