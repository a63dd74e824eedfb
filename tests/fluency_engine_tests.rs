mod common;

use std::collections::HashSet;

use common::*;
use fluency_engine::audit::AuditEvent;
use fluency_engine::fluency::config::TierCutPoints;
use fluency_engine::fluency::problem::Problem;
use fluency_engine::fluency::progress::MathFluencyProgress;
use fluency_engine::fluency::session::{SessionError, SessionPhase};
use fluency_engine::fluency::{AdvancementMode, ChallengeKind, EngineError, Operation, Tier};

#[tokio::test]
async fn test_fast_track_advances_from_sums_to_10() {
    let (engine, audit) = create_test_engine();
    seed_progress(&engine, MathFluencyProgress::new("s1", Operation::Addition, "sums-to-10", T0)).await;

    let session = engine.start_session("s1", Operation::Addition, T0).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Diagnostic);

    let session = play_round(&engine, &session, T0, correctly).await;
    let session = engine.advance_round(&session.id, T0 + 10_000).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Practice);
    assert!(session.fast_track);
    assert!(session.learning.skipped);

    let level = engine.config().curriculum.sub_level("sums-to-10").unwrap().clone();
    let mut missed = None;
    let session = play_round(&engine, &session, T0 + 20_000, |p| {
        if missed.is_none() && p.challenge.is_none() && level.contains(&p.problem) {
            missed = Some(p.problem.id.clone());
            "wrong".to_string()
        } else {
            p.problem.correct_answer()
        }
    })
    .await;
    assert!(missed.is_some());
    let practice_core = session.practice.attempts.iter().filter(|a| a.challenge.is_none()).count();
    assert_eq!(practice_core, 10);
    assert_eq!(session.practice.attempts.iter().filter(|a| !a.correct).count(), 1);

    let session = engine.advance_round(&session.id, T0 + 30_000).await.unwrap();
    assert_eq!(session.phase, SessionPhase::QuickCheck);
    let session = play_round(&engine, &session, T0 + 40_000, correctly).await;
    let session = engine.advance_round(&session.id, T0 + 50_000).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Completed);

    let decision = session.advancement.clone().unwrap();
    assert!(decision.advanced);
    assert_eq!(decision.mode, AdvancementMode::FastTrack);
    assert_eq!(decision.to_sub_level.as_deref(), Some("sums-to-20"));
    assert!(decision.proficiency >= 70.0);

    let progress = engine.progress_snapshot("s1", Operation::Addition).await.unwrap().unwrap();
    assert_eq!(progress.sub_level, "sums-to-20");
    assert_eq!(progress.total_sessions, 1);
    assert_eq!(progress.consecutive_practice_days, 1);
    assert_eq!(progress.high_accuracy_streak, 0);

    let events = audit.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], AuditEvent::SessionCompleted { .. }));
    assert_eq!(audit.decisions(), vec![decision]);
}

#[tokio::test]
async fn test_sliding_window_regression_through_sessions() {
    let cut = TierCutPoints::default();
    let problem = Problem::new(Operation::Addition, 4, 5).unwrap();
    let mut progress = MathFluencyProgress::new("s1", Operation::Addition, "sums-to-10", T0);
    for (i, correct) in [true, true, false, true, true].into_iter().enumerate() {
        progress.record_attempt(&problem, correct, 1_000, T0 + i as i64, &cut);
    }
    assert_eq!(progress.problem_banks.locate(&problem.id), Some(Tier::Proficient));

    let (engine, _) = create_test_engine();
    seed_progress(&engine, progress).await;

    let mut session = engine.start_session("s1", Operation::Addition, T0 + DAY_MS).await.unwrap();
    let mut seen = false;
    while session.phase != SessionPhase::Completed && !seen {
        session = play_round(&engine, &session, T0 + DAY_MS, |p| {
            if p.problem.id == problem.id {
                seen = true;
                "7".to_string()
            } else {
                p.problem.correct_answer()
            }
        })
        .await;
        if !seen {
            session = engine.advance_round(&session.id, T0 + DAY_MS).await.unwrap();
        }
    }

    // Non-secure known problems are planned first, so practice always reaches it.
    assert!(seen);
    let stored = engine.progress_snapshot("s1", Operation::Addition).await.unwrap().unwrap();
    let entry = stored.problem_banks.get(&problem.id).unwrap();
    assert_eq!(entry.proficiency_level, Tier::Approaching);
    assert_eq!(entry.last_attempts.len(), 5);
    assert_eq!(entry.total_attempts, 6);
}

#[tokio::test]
async fn test_struggling_student_gets_learning_round_and_holds() {
    let (engine, audit) = create_test_engine();
    let session = engine.start_session("s2", Operation::Subtraction, T0).await.unwrap();
    assert_eq!(session.sub_level_id, "from-5");

    let session = play_round(&engine, &session, T0, |_| "0.5".to_string()).await;
    let session = engine.advance_round(&session.id, T0 + 1).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Learning);
    assert!(!session.fast_track);

    let mut session = session;
    while session.phase != SessionPhase::Completed {
        session = play_round(&engine, &session, T0 + 2, |_| "99".to_string()).await;
        session = engine.advance_round(&session.id, T0 + 3).await.unwrap();
    }

    let summary = session.summary.clone().unwrap();
    assert_eq!(summary.correct, 0);
    assert!(!summary.learning_skipped);
    assert_eq!(summary.learning_accuracy, Some(0.0));

    let decision = session.advancement.clone().unwrap();
    assert!(!decision.advanced);
    assert_eq!(decision.mode, AdvancementMode::Standard);
    let progress = engine.progress_snapshot("s2", Operation::Subtraction).await.unwrap().unwrap();
    assert_eq!(progress.sub_level, "from-5");
    assert_eq!(progress.proficiency_percentage, 0.0);
    assert_eq!(audit.events().len(), 2);
}

#[tokio::test]
async fn test_previous_operation_challenges_update_their_own_record() {
    let (engine, _) = create_test_engine();
    let cut = TierCutPoints::default();
    let mut addition = MathFluencyProgress::new("s3", Operation::Addition, "sums-to-20", T0);
    for (l, r) in [(1, 1), (2, 2), (3, 1), (6, 4)] {
        let problem = Problem::new(Operation::Addition, l, r).unwrap();
        addition.record_attempt(&problem, true, 900, T0, &cut);
    }
    seed_progress(&engine, addition).await;

    let session = engine.start_session("s3", Operation::Subtraction, T0 + 1).await.unwrap();
    let cross: Vec<String> = session
        .challenges
        .iter()
        .filter(|c| c.kind == ChallengeKind::PreviousOperation)
        .map(|c| c.problem_id().to_string())
        .collect();
    assert_eq!(cross.len(), 2);

    let mut session = session;
    while session.phase != SessionPhase::Completed {
        session = play_round(&engine, &session, T0 + 2, correctly).await;
        session = engine.advance_round(&session.id, T0 + 3).await.unwrap();
    }

    let addition = engine.progress_snapshot("s3", Operation::Addition).await.unwrap().unwrap();
    for id in &cross {
        assert_eq!(addition.problem_banks.get(id).unwrap().total_attempts, 2);
    }
    let subtraction = engine.progress_snapshot("s3", Operation::Subtraction).await.unwrap().unwrap();
    assert!(subtraction.problem_banks.all_problems().all(|p| p.operation() == Operation::Subtraction));
}

#[tokio::test]
async fn test_terminal_sub_level_is_idempotent() {
    let (engine, _) = create_test_engine();
    let mut division = MathFluencyProgress::new("s4", Operation::Division, "divide-by-6-10", T0);
    division.completed = true;
    seed_progress(&engine, division).await;

    let first = play_perfect_session(&engine, "s4", Operation::Division, T0).await;
    let second = play_perfect_session(&engine, "s4", Operation::Division, T0 + DAY_MS).await;

    for session in [&first, &second] {
        let decision = session.advancement.as_ref().unwrap();
        assert!(!decision.advanced);
        assert!(decision.operation_complete);
        assert_eq!(decision.to_sub_level, None);
    }
    let progress = engine.progress_snapshot("s4", Operation::Division).await.unwrap().unwrap();
    assert_eq!(progress.sub_level, "divide-by-6-10");
    assert!(progress.completed);
    assert_eq!(progress.total_sessions, 2);
    assert_eq!(progress.consecutive_practice_days, 2);
}

#[tokio::test]
async fn test_abandoned_session_keeps_recorded_attempts() {
    let (engine, _) = create_test_engine();
    let session = engine.start_session("s5", Operation::Multiplication, T0).await.unwrap();
    let ids: Vec<String> = session
        .diagnostic
        .problems
        .iter()
        .take(2)
        .map(|p| p.problem.id.clone())
        .collect();
    for id in &ids {
        engine.submit_answer(&session.id, id, "0", 1_500, T0 + 5).await.unwrap();
    }

    let err = engine.advance_round(&session.id, T0 + 6).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::RoundIncomplete { remaining: 3, .. })
    ));

    let next = engine.start_session("s5", Operation::Multiplication, T0 + DAY_MS).await.unwrap();
    assert_eq!(next.session_number, 2);
    let progress = engine.progress_snapshot("s5", Operation::Multiplication).await.unwrap().unwrap();
    assert_eq!(progress.problem_banks.len(), 2);
    assert_eq!(progress.total_sessions, 0);
    for id in &ids {
        assert_eq!(progress.problem_banks.get(id).unwrap().total_attempts, 1);
    }
}

#[tokio::test]
async fn test_protocol_misuse_is_reported() {
    let (engine, _) = create_test_engine();
    let session = engine.start_session("s6", Operation::Addition, T0).await.unwrap();

    let err = engine
        .submit_answer(&session.id, "addition:99:99", "198", 1_000, T0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Session(SessionError::ProblemNotInRound(_))));

    let err = engine.submit_answer("missing", "addition:1:1", "2", 1_000, T0).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));

    let first = session.diagnostic.problems[0].problem.id.clone();
    engine.submit_answer(&session.id, &first, "1", 1_000, T0).await.unwrap();
    let err = engine.submit_answer(&session.id, &first, "1", 1_000, T0).await.unwrap_err();
    assert!(matches!(err, EngineError::Session(SessionError::AlreadyAttempted(_))));
}

#[tokio::test]
async fn test_consecutive_sessions_track_days_and_unique_problems() {
    let (engine, _) = create_test_engine();
    let mut last = None;
    for day in 0..3 {
        last = Some(play_perfect_session(&engine, "s7", Operation::Addition, T0 + day * DAY_MS).await);
    }
    let progress = engine.progress_snapshot("s7", Operation::Addition).await.unwrap().unwrap();
    assert_eq!(progress.total_sessions, 3);
    assert_eq!(progress.sessions_started, 3);
    assert_eq!(progress.consecutive_practice_days, 3);
    assert_eq!(progress.proficiency_history.len(), 3);

    let ids: Vec<&str> = progress.problem_banks.all_problems().map(|p| p.problem_id()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(last.unwrap().session_number, 3);
}

#[tokio::test]
async fn test_missed_challenges_do_not_block_advancement() {
    let (engine, _) = create_test_engine();
    let cut = TierCutPoints::default();
    let mut addition = MathFluencyProgress::new("s8", Operation::Addition, "sums-to-20", T0);
    for (l, r) in [(1, 1), (2, 2), (3, 1), (6, 4)] {
        let problem = Problem::new(Operation::Addition, l, r).unwrap();
        addition.record_attempt(&problem, true, 900, T0, &cut);
    }
    seed_progress(&engine, addition).await;
    seed_progress(&engine, MathFluencyProgress::new("s8", Operation::Subtraction, "from-10", T0)).await;

    let mut session = engine.start_session("s8", Operation::Subtraction, T0 + 1).await.unwrap();
    assert_eq!(session.challenges.len(), 4);
    while session.phase != SessionPhase::Completed {
        session = play_round(&engine, &session, T0 + 2, |p| match p.challenge {
            Some(_) => "wrong".to_string(),
            None => p.problem.correct_answer(),
        })
        .await;
        session = engine.advance_round(&session.id, T0 + 3).await.unwrap();
    }

    let missed = session.quick_check.attempts.iter().filter(|a| a.challenge.is_some()).count();
    assert_eq!(missed, 2);
    assert!(session.summary.as_ref().unwrap().quick_check_accuracy.unwrap() < 80.0);

    let decision = session.advancement.clone().unwrap();
    assert!(decision.advanced, "{}", decision.reason);
    assert_eq!(decision.mode, AdvancementMode::FastTrack);
    assert_eq!(decision.to_sub_level.as_deref(), Some("from-20"));
    let progress = engine.progress_snapshot("s8", Operation::Subtraction).await.unwrap().unwrap();
    assert_eq!(progress.sub_level, "from-20");
}
