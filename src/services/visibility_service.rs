use crate::dto::attempt_dto::{AnswerView, AttemptView};
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::quiz::Quiz;
use crate::models::user::Requester;

pub struct ResultVisibilityGate;

impl ResultVisibilityGate {
    /// Admins always see results. Everyone else sees them once the attempt is
    /// reviewed, or right away when the quiz allows it and has nothing that
    /// needs a human grader.
    pub fn is_visible(attempt: &Attempt, quiz: &Quiz, requester: &Requester) -> bool {
        if requester.is_admin() {
            return true;
        }
        if attempt.status == AttemptStatus::Reviewed {
            return true;
        }
        quiz.show_results_immediately && !quiz.has_free_text()
    }

    /// Builds the outbound view, stripping grading data the requester may not see.
    pub fn view(attempt: &Attempt, quiz: &Quiz, requester: &Requester) -> AttemptView {
        let visible = Self::is_visible(attempt, quiz, requester);
        let full = Self::unsanitized(attempt, visible);
        if !visible {
            return Self::sanitize(full);
        }
        if requester.is_admin() {
            return full;
        }
        Self::apply_settings(full, quiz)
    }

    /// Nulls the total and every answer's score, correctness and feedback.
    pub fn sanitize(mut view: AttemptView) -> AttemptView {
        view.total_score = None;
        view.results_visible = false;
        for answer in &mut view.answers {
            Self::strip_answer(answer);
        }
        view
    }

    fn strip_answer(answer: &mut AnswerView) {
        answer.score = None;
        answer.negative_score = None;
        answer.is_correct = None;
        answer.feedback = None;
    }

    fn apply_settings(mut view: AttemptView, quiz: &Quiz) -> AttemptView {
        let settings = quiz.result_visibility;
        if !settings.show_score {
            view.total_score = None;
        }
        for answer in &mut view.answers {
            if !settings.show_score {
                answer.score = None;
                answer.negative_score = None;
            }
            if !settings.show_correctness {
                answer.is_correct = None;
            }
            if !settings.show_feedback {
                answer.feedback = None;
            }
        }
        view
    }

    fn unsanitized(attempt: &Attempt, visible: bool) -> AttemptView {
        AttemptView {
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            user_id: attempt.user_id,
            status: attempt.status,
            timing_mode: attempt.timing_mode,
            start_time: attempt.start_time,
            end_time: attempt.end_time,
            total_score: Some(attempt.total_score),
            max_score: attempt.max_score,
            negative_marking_applied: attempt.negative_marking_applied,
            answers: attempt.answers.iter().map(AnswerView::from).collect(),
            timed_out_questions: attempt.timed_out_questions.clone(),
            reviewed_by: attempt.reviewed_by,
            reviewed_at: attempt.reviewed_at,
            results_visible: visible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answer::{Answer, AnswerResponse};
    use crate::models::question::{Question, QuestionType};
    use crate::models::quiz::TimingMode;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn quiz(show_immediately: bool, free_text: bool) -> Quiz {
        let question_type = if free_text {
            QuestionType::FreeText
        } else {
            QuestionType::SingleSelect
        };
        Quiz {
            id: Uuid::new_v4(),
            title: "Visibility".into(),
            description: None,
            timing_mode: TimingMode::Total,
            duration: Some(10),
            questions: vec![Question {
                id: Uuid::new_v4(),
                question_type,
                text: "q".into(),
                options: Vec::new(),
                points: Decimal::ONE,
                time_limit: None,
            }],
            negative_marking: Default::default(),
            result_visibility: Default::default(),
            show_results_immediately: show_immediately,
            activated_users: Vec::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn submitted(quiz: &Quiz, user: Uuid) -> Attempt {
        let answer = Answer {
            question_id: quiz.questions[0].id,
            response: AnswerResponse::Text {
                text_answer: "x".into(),
            },
            is_correct: Some(true),
            score: Decimal::ONE,
            negative_score: Decimal::ZERO,
            feedback: Some("good".into()),
        };
        Attempt::begin(quiz, user, Utc::now()).finish(
            AttemptStatus::Submitted,
            vec![answer],
            false,
            Utc::now(),
        )
    }

    #[test]
    fn free_text_forces_review_even_when_immediate() {
        let quiz = quiz(true, true);
        let user = Uuid::new_v4();
        let attempt = submitted(&quiz, user);

        assert!(!ResultVisibilityGate::is_visible(&attempt, &quiz, &Requester::user(user)));
        assert!(ResultVisibilityGate::is_visible(
            &attempt,
            &quiz,
            &Requester::admin(Uuid::new_v4())
        ));

        let view = ResultVisibilityGate::view(&attempt, &quiz, &Requester::user(user));
        assert_eq!(view.total_score, None);
        assert!(view
            .answers
            .iter()
            .all(|a| a.score.is_none() && a.is_correct.is_none() && a.feedback.is_none()));
    }

    #[test]
    fn immediate_results_without_free_text_are_visible() {
        let quiz = quiz(true, false);
        let user = Uuid::new_v4();
        let attempt = submitted(&quiz, user);
        let view = ResultVisibilityGate::view(&attempt, &quiz, &Requester::user(user));
        assert_eq!(view.total_score, Some(Decimal::ONE));
        assert!(view.results_visible);
    }

    #[test]
    fn reviewed_attempt_is_visible_and_honours_settings() {
        let mut quiz = quiz(false, true);
        quiz.result_visibility.show_feedback = false;
        let user = Uuid::new_v4();
        let attempt = submitted(&quiz, user).mark_reviewed(Uuid::new_v4(), Utc::now());

        let view = ResultVisibilityGate::view(&attempt, &quiz, &Requester::user(user));
        assert_eq!(view.total_score, Some(Decimal::ONE));
        assert_eq!(view.answers[0].feedback, None);
        assert_eq!(view.answers[0].is_correct, Some(true));
    }
}
