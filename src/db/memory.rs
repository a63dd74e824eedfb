use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::db::{ProgressRepository, RepositoryError};
use crate::fluency::progress::MathFluencyProgress;
use crate::fluency::session::Session;
use crate::fluency::types::Operation;

/// Process-local store for demos and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    progress: RwLock<HashMap<(String, Operation), MathFluencyProgress>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl ProgressRepository for MemoryRepository {
    async fn load_progress(
        &self,
        student_uid: &str,
        operation: Operation,
    ) -> Result<Option<MathFluencyProgress>, RepositoryError> {
        let guard = self.progress.read().await;
        Ok(guard.get(&(student_uid.to_string(), operation)).cloned())
    }

    async fn save_progress(&self, progress: &MathFluencyProgress) -> Result<(), RepositoryError> {
        let mut guard = self.progress.write().await;
        guard.insert(
            (progress.student_uid.clone(), progress.operation),
            progress.clone(),
        );
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }
}
