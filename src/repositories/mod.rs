pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::Attempt;
use crate::models::quiz::Quiz;

#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Quiz>>;
    async fn find_all(&self) -> Result<Vec<Quiz>>;
    /// Insert-or-replace.
    async fn save(&self, quiz: &Quiz) -> Result<()>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attempt>>;
    async fn find_in_progress(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Option<Attempt>>;
    /// Attempts of the quiz whose status is `submitted` or `reviewed`.
    async fn find_graded_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Attempt>>;
    async fn find_all_in_progress(&self) -> Result<Vec<Attempt>>;
    /// Fails with `Conflict` when the user already has an in-progress attempt for the quiz.
    async fn insert(&self, attempt: &Attempt) -> Result<()>;
    /// Compare-and-swap on `attempt.version`; returns the stored version.
    /// Fails with `Conflict` when someone else saved in between.
    async fn save(&self, attempt: &Attempt) -> Result<Attempt>;
}
