//! Facade tying sessions to persistence and the audit trail.
//!
//! Every attempt is saved as soon as it is graded. The random source is scoped to
//! synchronous blocks so the returned futures stay `Send`.

use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::db::{ProgressRepository, RepositoryError};
use crate::fluency::advancement::conclude_session;
use crate::fluency::challenge::select_challenge_problems;
use crate::fluency::config::{ConfigError, EngineConfig};
use crate::fluency::progress::MathFluencyProgress;
use crate::fluency::session::{LearningPhase, Session, SessionAttempt, SessionError, SessionPhase};
use crate::fluency::types::Operation;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("session {0} not found")]
    SessionNotFound(String),
}

pub struct FluencyEngine<R, A> {
    config: Arc<EngineConfig>,
    repository: Arc<R>,
    audit: Arc<A>,
}

impl<R, A> Clone for FluencyEngine<R, A> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            repository: Arc::clone(&self.repository),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<R: ProgressRepository, A: AuditSink> FluencyEngine<R, A> {
    /// Refuses an invalid configuration.
    pub fn new(config: EngineConfig, repository: Arc<R>, audit: Arc<A>) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            repository,
            audit,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Load or create the student's record for `operation`, pick challenge problems and
    /// open a session at the current sub-level.
    pub async fn start_session(
        &self,
        student_uid: &str,
        operation: Operation,
        now: i64,
    ) -> Result<Session, EngineError> {
        let mut progress = match self.repository.load_progress(student_uid, operation).await? {
            Some(progress) => progress,
            None => self.fresh_progress(student_uid, operation, now)?,
        };

        let mut all_progress = Vec::with_capacity(2);
        if let Some(previous_op) = self.config.curriculum.previous_operation(operation) {
            if let Some(previous) = self.repository.load_progress(student_uid, previous_op).await? {
                all_progress.push(previous);
            }
        }
        all_progress.push(progress.clone());

        let session = {
            let mut rng = rand::rng();
            let challenges = select_challenge_problems(
                operation,
                &progress.sub_level,
                &all_progress,
                self.config.challenge.target_count,
                &self.config.curriculum,
                &self.config.challenge,
                &mut rng,
            );
            Session::start(&mut progress, challenges, &self.config, &mut rng, now)?
        };

        self.repository.save_progress(&progress).await?;
        self.repository.save_session(&session).await?;
        Ok(session)
    }

    /// Grade an answer and persist the attempt into the record of the problem's own
    /// operation.
    pub async fn submit_answer(
        &self,
        session_id: &str,
        problem_id: &str,
        answer: &str,
        response_time_ms: u32,
        now: i64,
    ) -> Result<SessionAttempt, EngineError> {
        let mut session = self.load_session(session_id).await?;
        let operation = session
            .problem_operation(problem_id)
            .ok_or_else(|| SessionError::ProblemNotInRound(problem_id.to_string()))?;

        let mut progress = match self.repository.load_progress(&session.student_uid, operation).await? {
            Some(progress) => progress,
            None => {
                tracing::warn!(
                    student = %session.student_uid,
                    operation = %operation,
                    "no progress record for attempted problem; starting one"
                );
                self.fresh_progress(&session.student_uid, operation, now)?
            }
        };

        let attempt = session.record_attempt(
            &mut progress,
            problem_id,
            answer,
            response_time_ms,
            now,
            &self.config.cut_points,
        )?;

        self.repository.save_progress(&progress).await?;
        self.repository.save_session(&session).await?;
        Ok(attempt)
    }

    pub async fn advance_learning(&self, session_id: &str, problem_id: &str) -> Result<LearningPhase, EngineError> {
        let mut session = self.load_session(session_id).await?;
        let step = session.advance_learning(problem_id)?;
        self.repository.save_session(&session).await?;
        Ok(step)
    }

    /// Close the current round. On completion the session outcome goes through the
    /// advancement engine and both records are saved.
    pub async fn advance_round(&self, session_id: &str, now: i64) -> Result<Session, EngineError> {
        let mut session = self.load_session(session_id).await?;
        let stored = self
            .repository
            .load_progress(&session.student_uid, session.operation)
            .await?;
        if stored.is_none() {
            tracing::warn!(
                session_id = %session.id,
                student = %session.student_uid,
                operation = %session.operation,
                "progress record missing; planning from an empty record"
            );
        }
        let mut progress = stored.clone().unwrap_or_else(|| {
            MathFluencyProgress::new(&session.student_uid, session.operation, &session.sub_level_id, now)
        });

        let phase = {
            let mut rng = rand::rng();
            session.advance(&progress, &self.config, &mut rng, now)?
        };

        if phase == SessionPhase::Completed {
            if stored.is_some() {
                let decision = conclude_session(&mut progress, &session.outcome(), &self.config, now);
                if decision.advanced {
                    tracing::info!(
                        student = %session.student_uid,
                        operation = %session.operation,
                        from = %decision.from_sub_level,
                        to = ?decision.to_sub_level,
                        mode = %decision.mode,
                        "student advanced"
                    );
                }
                session.advancement = Some(decision);
                self.repository.save_progress(&progress).await?;
            }
            self.emit_completion(&session);
        }

        self.repository.save_session(&session).await?;
        Ok(session)
    }

    pub async fn progress_snapshot(
        &self,
        student_uid: &str,
        operation: Operation,
    ) -> Result<Option<MathFluencyProgress>, EngineError> {
        Ok(self.repository.load_progress(student_uid, operation).await?)
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<Session>, EngineError> {
        Ok(self.repository.load_session(session_id).await?)
    }

    async fn load_session(&self, session_id: &str) -> Result<Session, EngineError> {
        self.repository
            .load_session(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    fn fresh_progress(
        &self,
        student_uid: &str,
        operation: Operation,
        now: i64,
    ) -> Result<MathFluencyProgress, EngineError> {
        let first = self
            .config
            .curriculum
            .first_sub_level(operation)
            .ok_or(ConfigError::MissingOperation(operation))?;
        Ok(MathFluencyProgress::new(student_uid, operation, &first.id, now))
    }

    fn emit_completion(&self, session: &Session) {
        if let Some(summary) = &session.summary {
            self.audit.record(&AuditEvent::SessionCompleted {
                session_id: session.id.clone(),
                student_uid: session.student_uid.clone(),
                operation: session.operation,
                sub_level: session.sub_level_id.clone(),
                summary: summary.clone(),
            });
        }
        if let Some(decision) = &session.advancement {
            self.audit.record(&AuditEvent::Advancement {
                session_id: session.id.clone(),
                student_uid: session.student_uid.clone(),
                decision: decision.clone(),
            });
        }
    }
}
