//! Remaining/elapsed time for the two timing disciplines.
//!
//! Everything here is computed from stored timestamps and an explicit `now`,
//! so it can be called any number of times without changing the attempt.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::attempt_dto::{QuestionTiming, TimingResponse};
use crate::models::attempt::Attempt;
use crate::models::question::Question;
use crate::models::quiz::{Quiz, TimingMode};
use crate::utils::time::elapsed_secs;

/// Used when a per-question attempt meets a question that has no limit,
/// which only happens if the quiz was switched to total timing mid-attempt.
pub const DEFAULT_QUESTION_TIME_LIMIT_SECS: i64 = 60;

pub struct TimingPolicy;

impl TimingPolicy {
    pub fn question_limit(question: &Question) -> i64 {
        question
            .time_limit
            .unwrap_or(DEFAULT_QUESTION_TIME_LIMIT_SECS)
    }

    /// Whole budget in seconds, following the mode the attempt was started under.
    pub fn total_time(attempt: &Attempt, quiz: &Quiz) -> i64 {
        let per_question_budget = || quiz.questions.iter().map(Self::question_limit).sum();
        match attempt.timing_mode {
            TimingMode::Total => quiz
                .duration
                .map(|minutes| minutes * 60)
                .unwrap_or_else(per_question_budget),
            TimingMode::PerQuestion => per_question_budget(),
        }
    }

    pub fn elapsed_time(attempt: &Attempt, now: DateTime<Utc>) -> i64 {
        elapsed_secs(attempt.start_time, now)
    }

    pub fn remaining_time(attempt: &Attempt, quiz: &Quiz, now: DateTime<Utc>) -> i64 {
        (Self::total_time(attempt, quiz) - Self::elapsed_time(attempt, now)).max(0)
    }

    pub fn is_expired(attempt: &Attempt, quiz: &Quiz, now: DateTime<Utc>) -> bool {
        Self::remaining_time(attempt, quiz, now) == 0
    }

    /// How far past the whole budget the attempt is, in seconds (0 while time remains).
    pub fn overrun(attempt: &Attempt, quiz: &Quiz, now: DateTime<Utc>) -> i64 {
        (Self::elapsed_time(attempt, now) - Self::total_time(attempt, quiz)).max(0)
    }

    /// A never-shown question still has its full limit. Once shown, its countdown
    /// runs from the first-shown anchor and can only be lowered by a checkpoint.
    pub fn question_remaining_time(
        attempt: &Attempt,
        question_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> i64 {
        if attempt.is_question_timed_out(question_id) {
            return 0;
        }
        let Some(started) = attempt.question_start_times.get(&question_id) else {
            return limit.max(0);
        };
        let by_clock = limit - elapsed_secs(*started, now);
        let remaining = match attempt.question_time_remaining.get(&question_id) {
            Some(checkpoint) => by_clock.min(*checkpoint),
            None => by_clock,
        };
        remaining.max(0)
    }

    pub fn timing_info(attempt: &Attempt, quiz: &Quiz, now: DateTime<Utc>) -> TimingResponse {
        let question_time_limits = match attempt.timing_mode {
            TimingMode::Total => None,
            TimingMode::PerQuestion => Some(
                quiz.questions
                    .iter()
                    .map(|q| {
                        let limit = Self::question_limit(q);
                        QuestionTiming {
                            question_id: q.id,
                            time_limit: limit,
                            remaining_time: Self::question_remaining_time(attempt, q.id, limit, now),
                            timed_out: attempt.is_question_timed_out(q.id),
                        }
                    })
                    .collect(),
            ),
        };

        TimingResponse {
            timing_mode: attempt.timing_mode,
            remaining_time: Self::remaining_time(attempt, quiz, now),
            total_time: Self::total_time(attempt, quiz),
            question_time_limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn question(limit: Option<i64>) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_type: QuestionType::FreeText,
            text: "q".into(),
            options: Vec::new(),
            points: Decimal::ONE,
            time_limit: limit,
        }
    }

    fn quiz(mode: TimingMode, duration: Option<i64>, questions: Vec<Question>) -> Quiz {
        Quiz {
            id: Uuid::new_v4(),
            title: "timed".into(),
            description: None,
            timing_mode: mode,
            duration,
            questions,
            negative_marking: Default::default(),
            result_visibility: Default::default(),
            show_results_immediately: false,
            activated_users: Vec::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn total_mode_counts_down_and_floors_at_zero() {
        let quiz = quiz(TimingMode::Total, Some(2), vec![question(None)]);
        let start = Utc::now();
        let attempt = Attempt::begin(&quiz, Uuid::new_v4(), start);

        let mut previous = i64::MAX;
        for secs in [0, 1, 59, 60, 119, 120, 121, 10_000] {
            let remaining =
                TimingPolicy::remaining_time(&attempt, &quiz, start + Duration::seconds(secs));
            assert!(remaining <= previous);
            assert!(remaining >= 0);
            previous = remaining;
        }
        assert_eq!(TimingPolicy::remaining_time(&attempt, &quiz, start), 120);
        assert!(TimingPolicy::is_expired(&attempt, &quiz, start + Duration::seconds(120)));
        assert!(!TimingPolicy::is_expired(&attempt, &quiz, start + Duration::milliseconds(119_900)));
    }

    #[test]
    fn per_question_totals_and_limits_are_reported() {
        let quiz = quiz(
            TimingMode::PerQuestion,
            None,
            vec![question(Some(30)), question(Some(45))],
        );
        let start = Utc::now();
        let attempt = Attempt::begin(&quiz, Uuid::new_v4(), start);

        let info = TimingPolicy::timing_info(&attempt, &quiz, start + Duration::seconds(10));
        assert_eq!(info.total_time, 75);
        assert_eq!(info.remaining_time, 65);
        let limits = info.question_time_limits.expect("per-question limits");
        assert_eq!(limits.len(), 2);
        assert_eq!(limits[0].remaining_time, 20);
        // never shown, so still the full limit
        assert_eq!(limits[1].remaining_time, 45);
    }

    #[test]
    fn checkpoint_lowers_question_countdown() {
        let quiz = quiz(TimingMode::PerQuestion, None, vec![question(Some(60))]);
        let qid = quiz.questions[0].id;
        let start = Utc::now();
        let attempt = Attempt::begin(&quiz, Uuid::new_v4(), start).checkpoint_question(qid, 25);

        let now = start + Duration::seconds(5);
        assert_eq!(TimingPolicy::question_remaining_time(&attempt, qid, 60, now), 25);
        let later = start + Duration::seconds(50);
        assert_eq!(TimingPolicy::question_remaining_time(&attempt, qid, 60, later), 10);
    }

    #[test]
    fn timed_out_question_has_nothing_left() {
        let quiz = quiz(TimingMode::PerQuestion, None, vec![question(Some(60))]);
        let qid = quiz.questions[0].id;
        let start = Utc::now();
        let attempt = Attempt::begin(&quiz, Uuid::new_v4(), start).mark_question_timed_out(qid);
        assert_eq!(TimingPolicy::question_remaining_time(&attempt, qid, 60, start), 0);
    }

    #[test]
    fn attempt_keeps_its_timing_mode_after_quiz_changes() {
        let mut quiz = quiz(TimingMode::Total, Some(1), vec![question(Some(30)), question(Some(45))]);
        let start = Utc::now();
        let attempt = Attempt::begin(&quiz, Uuid::new_v4(), start);

        quiz.timing_mode = TimingMode::PerQuestion;
        quiz.duration = None;
        // snapshot says total; with no duration left it falls back to the question budget
        assert_eq!(TimingPolicy::total_time(&attempt, &quiz), 75);
        assert!(TimingPolicy::timing_info(&attempt, &quiz, start)
            .question_time_limits
            .is_none());
    }
}
