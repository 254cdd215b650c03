pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::repositories::postgres::{PgAttemptRepository, PgQuizRepository};
use crate::repositories::{AttemptRepository, QuizRepository};
use crate::services::{
    access_service::RosterAuthorizer, activity_service::PgActivityLogger,
    attempt_service::AttemptService, quiz_service::QuizService,
    recalculation_service::ScoreRecalculator, recording_service::PgRecordingService,
    Collaborators,
};
use crate::utils::time::SystemClock;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub attempt_service: AttemptService,
    pub quiz_service: QuizService,
}

impl AppState {
    /// Postgres-backed wiring used by the worker.
    pub fn new(pool: PgPool, recalculation_batch_limit: Option<usize>) -> Self {
        let quizzes: Arc<dyn QuizRepository> = Arc::new(PgQuizRepository::new(pool.clone()));
        let attempts: Arc<dyn AttemptRepository> = Arc::new(PgAttemptRepository::new(pool.clone()));
        let collaborators = Collaborators {
            recordings: Arc::new(PgRecordingService::new(pool.clone())),
            authorizer: Arc::new(RosterAuthorizer),
            activity: Arc::new(PgActivityLogger::new(pool)),
            clock: Arc::new(SystemClock),
        };
        Self::from_parts(quizzes, attempts, collaborators, recalculation_batch_limit)
    }

    pub fn from_parts(
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        collaborators: Collaborators,
        recalculation_batch_limit: Option<usize>,
    ) -> Self {
        let recalculator = ScoreRecalculator::new(
            attempts.clone(),
            collaborators.activity.clone(),
            collaborators.clock.clone(),
        )
        .with_batch_limit(recalculation_batch_limit);

        let attempt_service = AttemptService::new(quizzes.clone(), attempts, collaborators);
        let quiz_service = QuizService::new(quizzes, recalculator);

        Self {
            attempt_service,
            quiz_service,
        }
    }
}
