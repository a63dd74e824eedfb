//! SQLite persistence. Records are stored as JSON documents next to a few indexed
//! columns; writes upsert, so the last writer wins.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::db::{ProgressRepository, RepositoryError};
use crate::fluency::progress::MathFluencyProgress;
use crate::fluency::session::Session;
use crate::fluency::types::Operation;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "fluency_progress" (
        "studentUid" TEXT NOT NULL,
        "operation" TEXT NOT NULL,
        "subLevel" TEXT NOT NULL,
        "document" TEXT NOT NULL,
        "updatedAt" INTEGER NOT NULL,
        PRIMARY KEY ("studentUid", "operation")
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "fluency_sessions" (
        "id" TEXT PRIMARY KEY NOT NULL,
        "studentUid" TEXT NOT NULL,
        "operation" TEXT NOT NULL,
        "sessionNumber" INTEGER NOT NULL,
        "phase" TEXT NOT NULL,
        "document" TEXT NOT NULL,
        "updatedAt" INTEGER NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_fluency_sessions_student"
        ON "fluency_sessions" ("studentUid", "operation")"#,
];

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| RepositoryError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ProgressRepository for SqliteRepository {
    async fn load_progress(
        &self,
        student_uid: &str,
        operation: Operation,
    ) -> Result<Option<MathFluencyProgress>, RepositoryError> {
        let document: Option<String> = sqlx::query_scalar(
            r#"SELECT "document" FROM "fluency_progress" WHERE "studentUid" = ? AND "operation" = ?"#,
        )
        .bind(student_uid)
        .bind(operation.as_str())
        .fetch_optional(&self.pool)
        .await?;

        document
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn save_progress(&self, progress: &MathFluencyProgress) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(progress)?;
        sqlx::query(
            r#"
            INSERT INTO "fluency_progress" ("studentUid", "operation", "subLevel", "document", "updatedAt")
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT ("studentUid", "operation") DO UPDATE SET
                "subLevel" = excluded."subLevel",
                "document" = excluded."document",
                "updatedAt" = excluded."updatedAt"
            "#,
        )
        .bind(&progress.student_uid)
        .bind(progress.operation.as_str())
        .bind(&progress.sub_level)
        .bind(document)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let document: Option<String> =
            sqlx::query_scalar(r#"SELECT "document" FROM "fluency_sessions" WHERE "id" = ?"#)
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        document
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn save_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(session)?;
        let updated_at = session.completed_at.unwrap_or(session.started_at);
        sqlx::query(
            r#"
            INSERT INTO "fluency_sessions" ("id", "studentUid", "operation", "sessionNumber", "phase", "document", "updatedAt")
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT ("id") DO UPDATE SET
                "phase" = excluded."phase",
                "document" = excluded."document",
                "updatedAt" = excluded."updatedAt"
            "#,
        )
        .bind(&session.id)
        .bind(&session.student_uid)
        .bind(session.operation.as_str())
        .bind(i64::from(session.session_number))
        .bind(session.phase.as_str())
        .bind(document)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
