#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use rust_decimal::Decimal;
use uuid::Uuid;

use quiz_proctor_backend::dto::attempt_dto::AnswerSubmission;
use quiz_proctor_backend::models::question::{Question, QuestionOption, QuestionType};
use quiz_proctor_backend::models::quiz::{NegativeMarking, Quiz, TimingMode};
use quiz_proctor_backend::repositories::memory::{InMemoryAttemptRepository, InMemoryQuizRepository};
use quiz_proctor_backend::repositories::{AttemptRepository, QuizRepository};
use quiz_proctor_backend::services::access_service::RosterAuthorizer;
use quiz_proctor_backend::services::activity_service::TracingActivityLogger;
use quiz_proctor_backend::services::recording_service::RecordingService;
use quiz_proctor_backend::services::Collaborators;
use quiz_proctor_backend::utils::time::ManualClock;
use quiz_proctor_backend::AppState;

mock! {
    pub Recordings {}
    #[async_trait]
    impl RecordingService for Recordings {
        async fn stop_active_recordings(&self, attempt_id: Uuid) -> quiz_proctor_backend::error::Result<u64>;
    }
}

pub fn idle_recordings() -> MockRecordings {
    let mut recordings = MockRecordings::new();
    recordings
        .expect_stop_active_recordings()
        .returning(|_| Ok(0));
    recordings
}

pub struct Harness {
    pub state: AppState,
    pub quizzes: Arc<InMemoryQuizRepository>,
    pub attempts: Arc<InMemoryAttemptRepository>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_recordings(idle_recordings())
    }

    pub fn with_recordings(recordings: MockRecordings) -> Self {
        let attempts = Arc::new(InMemoryAttemptRepository::new());
        Self::with_attempt_repository(recordings, attempts.clone(), attempts)
    }

    /// `attempt_repo` is what the services use; `attempts` is kept for direct inspection.
    pub fn with_attempt_repository(
        recordings: MockRecordings,
        attempts: Arc<InMemoryAttemptRepository>,
        attempt_repo: Arc<dyn AttemptRepository>,
    ) -> Self {
        let quizzes = Arc::new(InMemoryQuizRepository::new());
        let clock = ManualClock::new(Utc::now());
        let collaborators = Collaborators {
            recordings: Arc::new(recordings),
            authorizer: Arc::new(RosterAuthorizer),
            activity: Arc::new(TracingActivityLogger),
            clock: Arc::new(clock.clone()),
        };
        let state = AppState::from_parts(
            quizzes.clone() as Arc<dyn QuizRepository>,
            attempt_repo,
            collaborators,
            None,
        );
        Self {
            state,
            quizzes,
            attempts,
            clock,
        }
    }

    pub async fn add_quiz(&self, quiz: &Quiz) {
        self.quizzes.save(quiz).await.expect("save quiz");
    }
}

pub fn option(id: &str, is_correct: bool) -> QuestionOption {
    QuestionOption {
        id: id.to_string(),
        text: format!("Option {}", id),
        is_correct,
        probability: None,
    }
}

/// Options `A` and `B`, `B` is correct, worth one point.
pub fn single_select(time_limit: Option<i64>) -> Question {
    Question {
        id: Uuid::new_v4(),
        question_type: QuestionType::SingleSelect,
        text: "Pick the right one".into(),
        options: vec![option("A", false), option("B", true)],
        points: Decimal::ONE,
        time_limit,
    }
}

pub fn free_text(time_limit: Option<i64>) -> Question {
    Question {
        id: Uuid::new_v4(),
        question_type: QuestionType::FreeText,
        text: "Explain".into(),
        options: Vec::new(),
        points: Decimal::from(2),
        time_limit,
    }
}

pub fn total_quiz(questions: Vec<Question>, duration_minutes: i64, users: &[Uuid]) -> Quiz {
    Quiz {
        id: Uuid::new_v4(),
        title: "Proctored quiz".into(),
        description: Some("integration".into()),
        timing_mode: TimingMode::Total,
        duration: Some(duration_minutes),
        questions,
        negative_marking: NegativeMarking::default(),
        result_visibility: Default::default(),
        show_results_immediately: false,
        activated_users: users.to_vec(),
        is_active: true,
        created_at: None,
        updated_at: None,
    }
}

pub fn per_question_quiz(questions: Vec<Question>, users: &[Uuid]) -> Quiz {
    Quiz {
        timing_mode: TimingMode::PerQuestion,
        duration: None,
        ..total_quiz(questions, 1, users)
    }
}

pub fn pick(question: &Question, ids: &[&str]) -> AnswerSubmission {
    AnswerSubmission {
        question_id: question.id,
        selected_options: Some(ids.iter().map(|s| s.to_string()).collect()),
        text_answer: None,
    }
}

pub fn write(question: &Question, text: &str) -> AnswerSubmission {
    AnswerSubmission {
        question_id: question.id,
        selected_options: None,
        text_answer: Some(text.to_string()),
    }
}
