use std::sync::Arc;

use rand::Rng;

use fluency_engine::audit::TracingAuditSink;
use fluency_engine::config::Config;
use fluency_engine::db::{MemoryRepository, ProgressRepository, SqliteRepository};
use fluency_engine::fluency::session::{LearningPhase, SessionPhase};
use fluency_engine::fluency::{EngineConfig, EngineError, FluencyEngine, Operation};
use fluency_engine::logging::init_tracing;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level, config.log_dir.as_deref());

    let engine_config = match EngineConfig::load(config.engine_config_path.as_deref()) {
        Ok(engine_config) => engine_config,
        Err(err) => {
            tracing::error!(error = %err, "engine configuration rejected");
            std::process::exit(1);
        }
    };

    let result = match &config.database_url {
        Some(url) => match SqliteRepository::connect(url).await {
            Ok(repository) => run(&config, engine_config, repository).await,
            Err(err) => {
                tracing::error!(error = %err, "failed to open sqlite store");
                std::process::exit(1);
            }
        },
        None => run(&config, engine_config, MemoryRepository::new()).await,
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "demo run failed");
        std::process::exit(1);
    }
}

/// Plays the assignment layer: one simulated student, one session per day.
async fn run<R: ProgressRepository>(
    config: &Config,
    engine_config: EngineConfig,
    repository: R,
) -> Result<(), EngineError> {
    let engine = FluencyEngine::new(engine_config, Arc::new(repository), Arc::new(TracingAuditSink))?;
    let student = config.demo_student.as_str();
    let mut operation = Operation::Addition;
    let mut now = chrono::Utc::now().timestamp_millis();

    tracing::info!(student, sessions = config.demo_sessions, "starting demo");

    for _ in 0..config.demo_sessions {
        if let Some(progress) = engine.progress_snapshot(student, operation).await? {
            if progress.completed {
                match engine.config().curriculum.next_operation(operation) {
                    Some(next) => operation = next,
                    None => {
                        tracing::info!(student, "every operation complete");
                        break;
                    }
                }
            }
        }

        let mut session = engine.start_session(student, operation, now).await?;
        let mut clock = now;
        while session.phase != SessionPhase::Completed {
            while let Some(next) = session.next_problem().cloned() {
                if next.learning_phase.is_some() {
                    while engine.advance_learning(&session.id, next.problem_id()).await? != LearningPhase::Recall {}
                }
                let (answer, response_ms) = simulated_answer(&next.problem.correct_answer(), config.demo_accuracy);
                clock += i64::from(response_ms);
                engine
                    .submit_answer(&session.id, next.problem_id(), &answer, response_ms, clock)
                    .await?;
                session = match engine.session(&session.id).await? {
                    Some(session) => session,
                    None => return Err(EngineError::SessionNotFound(session.id.clone())),
                };
            }
            session = engine.advance_round(&session.id, clock).await?;
        }

        if let Some(summary) = &session.summary {
            tracing::info!(
                session_number = session.session_number,
                operation = %session.operation,
                sub_level = %session.sub_level_id,
                accuracy = summary.accuracy,
                quality = summary.quality.as_str(),
                fast_track = summary.fast_track,
                "session finished"
            );
        }
        now += DAY_MS;
    }

    for &op in Operation::all() {
        if let Some(progress) = engine.progress_snapshot(student, op).await? {
            tracing::info!(
                operation = %op,
                sub_level = %progress.sub_level,
                proficiency = progress.proficiency_percentage,
                mastery = progress.mastery_percentage,
                streak_days = progress.consecutive_practice_days,
                completed = progress.completed,
                "final progress"
            );
        }
    }
    Ok(())
}

/// Correct answers sometimes arrive in an equivalent fractional form.
fn simulated_answer(correct: &str, accuracy: f64) -> (String, u32) {
    let mut rng = rand::rng();
    let response_ms = rng.random_range(800..4_000);
    if !rng.random_bool(accuracy) {
        return ("?".to_string(), response_ms);
    }
    let answer = match correct.parse::<u32>() {
        Ok(value) if rng.random_bool(0.1) => format!("{}/2", value * 2),
        _ => correct.to_string(),
    };
    (answer, response_ms)
}
