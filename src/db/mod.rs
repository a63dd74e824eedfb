pub mod memory;
pub mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use crate::fluency::progress::MathFluencyProgress;
use crate::fluency::session::Session;
use crate::fluency::types::Operation;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("document encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid database url: {0}")]
    Config(String),
}

/// Storage for progress records and sessions. Saves are last-write-wins; callers
/// serialize access per (student, operation).
#[allow(async_fn_in_trait)]
pub trait ProgressRepository: Send + Sync {
    async fn load_progress(
        &self,
        student_uid: &str,
        operation: Operation,
    ) -> Result<Option<MathFluencyProgress>, RepositoryError>;

    async fn save_progress(&self, progress: &MathFluencyProgress) -> Result<(), RepositoryError>;

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError>;

    async fn save_session(&self, session: &Session) -> Result<(), RepositoryError>;
}
