#![allow(dead_code)]

use std::sync::Arc;

use fluency_engine::audit::MemoryAuditSink;
use fluency_engine::db::{MemoryRepository, ProgressRepository};
use fluency_engine::fluency::progress::MathFluencyProgress;
use fluency_engine::fluency::session::{LearningPhase, Session, SessionPhase};
use fluency_engine::fluency::{EngineConfig, FluencyEngine, Operation};

pub type TestEngine = FluencyEngine<MemoryRepository, MemoryAuditSink>;

pub const T0: i64 = 1_700_000_000_000;
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub fn create_test_engine() -> (TestEngine, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = FluencyEngine::new(
        EngineConfig::default(),
        Arc::new(MemoryRepository::new()),
        Arc::clone(&audit),
    )
    .expect("default config is valid");
    (engine, audit)
}

pub async fn seed_progress(engine: &TestEngine, progress: MathFluencyProgress) {
    engine
        .repository()
        .save_progress(&progress)
        .await
        .expect("save progress");
}

/// Answer every open problem of the current round, stepping learning problems to
/// recall first. `answer` decides what the student types.
pub async fn play_round<F>(engine: &TestEngine, session: &Session, now: i64, mut answer: F) -> Session
where
    F: FnMut(&fluency_engine::fluency::session::SessionProblem) -> String,
{
    let mut current = session.clone();
    let mut clock = now;
    while let Some(next) = current.next_problem().cloned() {
        if next.learning_phase.is_some() {
            loop {
                let step = engine
                    .advance_learning(&current.id, next.problem_id())
                    .await
                    .expect("advance learning");
                if step == LearningPhase::Recall {
                    break;
                }
            }
        }
        clock += 1_000;
        engine
            .submit_answer(&current.id, next.problem_id(), &answer(&next), 1_000, clock)
            .await
            .expect("submit answer");
        current = engine
            .session(&current.id)
            .await
            .expect("load session")
            .expect("session exists");
    }
    current
}

pub fn correctly(problem: &fluency_engine::fluency::session::SessionProblem) -> String {
    problem.problem.correct_answer()
}

/// Run a whole session answering everything correctly.
pub async fn play_perfect_session(engine: &TestEngine, student: &str, operation: Operation, now: i64) -> Session {
    let mut session = engine.start_session(student, operation, now).await.expect("start session");
    while session.phase != SessionPhase::Completed {
        session = play_round(engine, &session, now, correctly).await;
        session = engine.advance_round(&session.id, now + 60_000).await.expect("advance round");
    }
    session
}
