use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::quiz::Quiz;
use crate::models::user::Requester;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub is_admin: bool,
    pub is_activated: bool,
}

impl Access {
    /// Admins bypass both the activation roster and the active flag.
    pub fn can_attempt(&self, quiz: &Quiz) -> Result<()> {
        if self.is_admin {
            return Ok(());
        }
        if !quiz.is_active {
            return Err(Error::AccessDenied(format!("quiz {} is not active", quiz.id)));
        }
        if !self.is_activated {
            return Err(Error::AccessDenied(format!(
                "user is not activated for quiz {}",
                quiz.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn access(&self, requester: &Requester, quiz: &Quiz) -> Result<Access>;
}

/// Role comes from the session, activation from the quiz's own roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct RosterAuthorizer;

#[async_trait]
impl Authorizer for RosterAuthorizer {
    async fn access(&self, requester: &Requester, quiz: &Quiz) -> Result<Access> {
        Ok(Access {
            is_admin: requester.is_admin(),
            is_activated: quiz.is_user_activated(requester.user_id),
        })
    }
}

pub fn require_admin(requester: &Requester) -> Result<()> {
    if requester.is_admin() {
        Ok(())
    } else {
        Err(Error::AccessDenied("admin access required".to_string()))
    }
}
