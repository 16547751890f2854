//! Session persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::access::AccessCode;
use crate::state::Session;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("access code {code} is already used by session {session_id}")]
    DuplicateAccessCode { code: AccessCode, session_id: String },
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Facilitator-owned session store, injected into every client.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError>;

    /// Resolve a join code typed by a team.
    async fn find_by_access_code(
        &self,
        code: &AccessCode,
    ) -> Result<Option<Session>, RepositoryError>;

    /// Insert or replace a session. Access codes are unique across sessions.
    async fn save(&self, session: Session) -> Result<(), RepositoryError>;

    /// Returns true when a session was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, RepositoryError>;

    async fn list(&self) -> Result<Vec<Session>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn find_by_access_code(
        &self,
        code: &AccessCode,
    ) -> Result<Option<Session>, RepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|session| &session.access_code == code)
            .cloned())
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(other) = sessions
            .values()
            .find(|other| other.access_code == session.access_code && other.id != session.id)
        {
            return Err(RepositoryError::DuplicateAccessCode {
                code: session.access_code.clone(),
                session_id: other.id.clone(),
            });
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<Session>, RepositoryError> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }
}
