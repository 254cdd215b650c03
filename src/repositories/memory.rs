use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AttemptRepository, QuizRepository};
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::quiz::Quiz;

#[derive(Default)]
pub struct InMemoryQuizRepository {
    quizzes: RwLock<HashMap<Uuid, Quiz>>,
}

impl InMemoryQuizRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizRepository for InMemoryQuizRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Quiz>> {
        Ok(self.quizzes.read().await.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Quiz>> {
        Ok(self.quizzes.read().await.values().cloned().collect())
    }

    async fn save(&self, quiz: &Quiz) -> Result<()> {
        self.quizzes.write().await.insert(quiz.id, quiz.clone());
        Ok(())
    }
}

/// Mirrors the Postgres guarantees: one in-progress attempt per (user, quiz)
/// and version-checked saves.
#[derive(Default)]
pub struct InMemoryAttemptRepository {
    attempts: RwLock<HashMap<Uuid, Attempt>>,
}

impl InMemoryAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attempt>> {
        Ok(self.attempts.read().await.get(&id).cloned())
    }

    async fn find_in_progress(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Option<Attempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .values()
            .find(|a| {
                a.user_id == user_id
                    && a.quiz_id == quiz_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn find_graded_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Attempt>> {
        let mut rows: Vec<Attempt> = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| {
                a.quiz_id == quiz_id
                    && matches!(a.status, AttemptStatus::Submitted | AttemptStatus::Reviewed)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.start_time);
        Ok(rows)
    }

    async fn find_all_in_progress(&self) -> Result<Vec<Attempt>> {
        let mut rows: Vec<Attempt> = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| a.status == AttemptStatus::InProgress)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.start_time);
        Ok(rows)
    }

    async fn insert(&self, attempt: &Attempt) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let duplicate = attempt.status == AttemptStatus::InProgress
            && attempts.values().any(|a| {
                a.user_id == attempt.user_id
                    && a.quiz_id == attempt.quiz_id
                    && a.status == AttemptStatus::InProgress
            });
        if duplicate {
            return Err(Error::Conflict(
                "An in-progress attempt already exists for this quiz".to_string(),
            ));
        }
        if attempts.contains_key(&attempt.id) {
            return Err(Error::Conflict(format!("attempt {} already exists", attempt.id)));
        }
        attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn save(&self, attempt: &Attempt) -> Result<Attempt> {
        let mut attempts = self.attempts.write().await;
        let stored = attempts
            .get(&attempt.id)
            .ok_or_else(|| Error::NotFound(format!("attempt {} not found", attempt.id)))?;
        if stored.version != attempt.version {
            return Err(Error::Conflict(format!(
                "attempt {} was modified concurrently",
                attempt.id
            )));
        }
        let mut next = attempt.clone();
        next.version += 1;
        attempts.insert(next.id, next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::TimingMode;
    use chrono::Utc;

    fn quiz() -> Quiz {
        Quiz {
            id: Uuid::new_v4(),
            title: "Quiz".into(),
            description: None,
            timing_mode: TimingMode::Total,
            duration: Some(5),
            questions: Vec::new(),
            negative_marking: Default::default(),
            result_visibility: Default::default(),
            show_results_immediately: false,
            activated_users: Vec::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn second_in_progress_insert_conflicts() {
        let repo = InMemoryAttemptRepository::new();
        let quiz = quiz();
        let user = Uuid::new_v4();

        repo.insert(&Attempt::begin(&quiz, user, Utc::now()))
            .await
            .unwrap();
        let err = repo
            .insert(&Attempt::begin(&quiz, user, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn stale_version_save_conflicts() {
        let repo = InMemoryAttemptRepository::new();
        let attempt = Attempt::begin(&quiz(), Uuid::new_v4(), Utc::now());
        repo.insert(&attempt).await.unwrap();

        let first = repo.save(&attempt).await.unwrap();
        assert_eq!(first.version, 1);

        let err = repo.save(&attempt).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
