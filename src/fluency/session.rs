//! Session orchestration.
//!
//! A session walks `diagnostic → learning → practice → quickCheck → completed`.
//! Each transition is caller driven: every problem of the current round must be
//! attempted before [`Session::advance`] moves on. Attempts are written into the
//! caller's `MathFluencyProgress` as they arrive, so an abandoned session never
//! loses recorded history.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fluency::advancement::{AdvancementDecision, SessionOutcome};
use crate::fluency::challenge::ChallengeProblem;
use crate::fluency::config::{EngineConfig, QualityBands, TierCutPoints};
use crate::fluency::curriculum::SubLevel;
use crate::fluency::problem::Problem;
use crate::fluency::progress::{MathFluencyProgress, TierTransition};
use crate::fluency::types::{ChallengeKind, Operation, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Diagnostic,
    Learning,
    Practice,
    QuickCheck,
    Completed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Diagnostic => "diagnostic",
            SessionPhase::Learning => "learning",
            SessionPhase::Practice => "practice",
            SessionPhase::QuickCheck => "quickCheck",
            SessionPhase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guided steps of a learning-round problem. Only `Recall` accepts an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LearningPhase {
    Encoding,
    Consolidation,
    Recall,
    Feedback,
}

impl LearningPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Encoding => "encoding",
            LearningPhase::Consolidation => "consolidation",
            LearningPhase::Recall => "recall",
            LearningPhase::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for LearningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is already completed")]
    Completed,
    #[error("{phase} round still has {remaining} unattempted problems")]
    RoundIncomplete { phase: SessionPhase, remaining: usize },
    #[error("problem {0} is not part of the current round")]
    ProblemNotInRound(String),
    #[error("problem {0} was already attempted in this round")]
    AlreadyAttempted(String),
    #[error("problem {problem_id} is {found}, progress record is {expected}")]
    OperationMismatch {
        problem_id: String,
        expected: Operation,
        found: Operation,
    },
    #[error("problem {problem_id} is at learning step {phase}")]
    LearningPhase { problem_id: String, phase: LearningPhase },
    #[error("unknown sub-level {0}")]
    UnknownSubLevel(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProblem {
    pub problem: Problem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_phase: Option<LearningPhase>,
    pub attempted: bool,
}

impl SessionProblem {
    fn plain(problem: Problem) -> Self {
        Self {
            problem,
            challenge: None,
            learning_phase: None,
            attempted: false,
        }
    }

    fn learning(problem: Problem) -> Self {
        Self {
            learning_phase: Some(LearningPhase::Encoding),
            ..Self::plain(problem)
        }
    }

    fn challenge(challenge: &ChallengeProblem) -> Self {
        Self {
            challenge: Some(challenge.kind),
            ..Self::plain(challenge.progress.problem.clone())
        }
    }

    pub fn problem_id(&self) -> &str {
        &self.problem.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAttempt {
    pub phase: SessionPhase,
    pub problem_id: String,
    pub operation: Operation,
    pub answer: String,
    pub correct: bool,
    pub response_time_ms: u32,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeKind>,
    pub transition: TierTransition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub problems: Vec<SessionProblem>,
    pub attempts: Vec<SessionAttempt>,
    pub skipped: bool,
}

impl Round {
    fn planned(problems: Vec<SessionProblem>) -> Self {
        Self {
            problems,
            ..Self::default()
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.problems.iter().filter(|p| !p.attempted).count()
    }

    pub fn correct(&self) -> usize {
        self.attempts.iter().filter(|a| a.correct).count()
    }

    /// Percentage correct, `None` when nothing was attempted.
    pub fn accuracy(&self) -> Option<f64> {
        if self.attempts.is_empty() {
            None
        } else {
            Some(self.correct() as f64 * 100.0 / self.attempts.len() as f64)
        }
    }

    /// Accuracy over the round's own problems, ignoring challenge problems.
    pub fn core_accuracy(&self) -> Option<f64> {
        let (total, correct) = self
            .attempts
            .iter()
            .filter(|a| a.challenge.is_none())
            .fold((0usize, 0usize), |(t, c), a| (t + 1, c + usize::from(a.correct)));
        if total == 0 {
            None
        } else {
            Some(correct as f64 * 100.0 / total as f64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionQuality {
    Excellent,
    Good,
    Fair,
    NeedsPractice,
}

impl SessionQuality {
    pub fn from_accuracy(accuracy: f64, bands: &QualityBands) -> Self {
        if accuracy >= bands.excellent {
            SessionQuality::Excellent
        } else if accuracy >= bands.good {
            SessionQuality::Good
        } else if accuracy >= bands.fair {
            SessionQuality::Fair
        } else {
            SessionQuality::NeedsPractice
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionQuality::Excellent => "excellent",
            SessionQuality::Good => "good",
            SessionQuality::Fair => "fair",
            SessionQuality::NeedsPractice => "needs-practice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub duration_ms: i64,
    pub total_problems: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub average_response_time_ms: f64,
    pub quality: SessionQuality,
    pub diagnostic_accuracy: Option<f64>,
    pub learning_accuracy: Option<f64>,
    pub practice_accuracy: Option<f64>,
    pub quick_check_accuracy: Option<f64>,
    pub learning_skipped: bool,
    pub fast_track: bool,
    pub challenge_attempts: usize,
    pub challenge_correct: usize,
    /// Practice-round tier changes, one per attempt.
    pub tier_transitions: Vec<TierTransition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub student_uid: String,
    pub operation: Operation,
    pub sub_level_id: String,
    pub session_number: u32,
    pub phase: SessionPhase,
    pub diagnostic: Round,
    pub learning: Round,
    pub practice: Round,
    pub quick_check: Round,
    /// Challenge problems selected at start, shared between practice and quick-check.
    pub challenges: Vec<ChallengeProblem>,
    pub fast_track: bool,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub summary: Option<SessionSummary>,
    pub advancement: Option<AdvancementDecision>,
}

impl Session {
    pub fn start<R: Rng + ?Sized>(
        progress: &mut MathFluencyProgress,
        challenges: Vec<ChallengeProblem>,
        config: &EngineConfig,
        rng: &mut R,
        now: i64,
    ) -> Result<Self, SessionError> {
        let sub_level = config
            .curriculum
            .sub_level(&progress.sub_level)
            .ok_or_else(|| SessionError::UnknownSubLevel(progress.sub_level.clone()))?;

        let mut pool = sub_level.problems();
        pool.shuffle(rng);
        pool.truncate(config.session.diagnostic_size);
        let diagnostic = Round::planned(pool.into_iter().map(SessionProblem::plain).collect());

        progress.sessions_started = progress.sessions_started.saturating_add(1);
        progress.updated_at = now;

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_uid: progress.student_uid.clone(),
            operation: progress.operation,
            sub_level_id: sub_level.id.clone(),
            session_number: progress.sessions_started,
            phase: SessionPhase::Diagnostic,
            diagnostic,
            learning: Round::default(),
            practice: Round::default(),
            quick_check: Round::default(),
            challenges,
            fast_track: false,
            started_at: now,
            completed_at: None,
            summary: None,
            advancement: None,
        };
        tracing::info!(
            session_id = %session.id,
            student = %session.student_uid,
            operation = %session.operation,
            sub_level = %session.sub_level_id,
            session_number = session.session_number,
            challenges = session.challenges.len(),
            "session started"
        );
        Ok(session)
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    pub fn round(&self, phase: SessionPhase) -> Option<&Round> {
        match phase {
            SessionPhase::Diagnostic => Some(&self.diagnostic),
            SessionPhase::Learning => Some(&self.learning),
            SessionPhase::Practice => Some(&self.practice),
            SessionPhase::QuickCheck => Some(&self.quick_check),
            SessionPhase::Completed => None,
        }
    }

    fn round_mut(&mut self, phase: SessionPhase) -> Option<&mut Round> {
        match phase {
            SessionPhase::Diagnostic => Some(&mut self.diagnostic),
            SessionPhase::Learning => Some(&mut self.learning),
            SessionPhase::Practice => Some(&mut self.practice),
            SessionPhase::QuickCheck => Some(&mut self.quick_check),
            SessionPhase::Completed => None,
        }
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.round(self.phase)
    }

    /// First unattempted problem of the current round.
    pub fn next_problem(&self) -> Option<&SessionProblem> {
        self.current_round()?.problems.iter().find(|p| !p.attempted)
    }

    /// Operation of a problem in the current round; cross-operation challenges differ
    /// from the session's own operation.
    pub fn problem_operation(&self, problem_id: &str) -> Option<Operation> {
        self.current_round()?
            .problems
            .iter()
            .find(|p| p.problem_id() == problem_id)
            .map(|p| p.problem.operation)
    }

    /// Step a learning problem towards recall. Recall waits for an attempt.
    pub fn advance_learning(&mut self, problem_id: &str) -> Result<LearningPhase, SessionError> {
        if self.phase == SessionPhase::Completed {
            return Err(SessionError::Completed);
        }
        if self.phase != SessionPhase::Learning {
            return Err(SessionError::ProblemNotInRound(problem_id.to_string()));
        }
        let entry = self
            .learning
            .problems
            .iter_mut()
            .find(|p| p.problem.id == problem_id)
            .ok_or_else(|| SessionError::ProblemNotInRound(problem_id.to_string()))?;

        let current = entry.learning_phase.unwrap_or(LearningPhase::Encoding);
        let next = match current {
            LearningPhase::Encoding => LearningPhase::Consolidation,
            LearningPhase::Consolidation => LearningPhase::Recall,
            LearningPhase::Recall => {
                return Err(SessionError::LearningPhase {
                    problem_id: problem_id.to_string(),
                    phase: current,
                })
            }
            LearningPhase::Feedback => LearningPhase::Feedback,
        };
        entry.learning_phase = Some(next);
        Ok(next)
    }

    /// Grade and record one answer. `progress` must be the record for the problem's
    /// operation, which differs from the session's for previous-operation challenges.
    pub fn record_attempt(
        &mut self,
        progress: &mut MathFluencyProgress,
        problem_id: &str,
        answer: &str,
        response_time_ms: u32,
        now: i64,
        cut_points: &TierCutPoints,
    ) -> Result<SessionAttempt, SessionError> {
        let phase = self.phase;
        let round = self.round_mut(phase).ok_or(SessionError::Completed)?;
        let entry = round
            .problems
            .iter_mut()
            .find(|p| p.problem.id == problem_id)
            .ok_or_else(|| SessionError::ProblemNotInRound(problem_id.to_string()))?;

        if entry.attempted {
            return Err(SessionError::AlreadyAttempted(problem_id.to_string()));
        }
        if entry.problem.operation != progress.operation {
            return Err(SessionError::OperationMismatch {
                problem_id: problem_id.to_string(),
                expected: progress.operation,
                found: entry.problem.operation,
            });
        }
        if let Some(step) = entry.learning_phase {
            if step != LearningPhase::Recall {
                return Err(SessionError::LearningPhase {
                    problem_id: problem_id.to_string(),
                    phase: step,
                });
            }
            entry.learning_phase = Some(LearningPhase::Feedback);
        }

        let correct = entry.problem.grade(answer);
        let transition = progress.record_attempt(&entry.problem, correct, response_time_ms, now, cut_points);
        entry.attempted = true;

        let attempt = SessionAttempt {
            phase,
            problem_id: problem_id.to_string(),
            operation: entry.problem.operation,
            answer: answer.to_string(),
            correct,
            response_time_ms,
            timestamp: now,
            challenge: entry.challenge,
            transition,
        };
        round.attempts.push(attempt.clone());

        if attempt.transition.changed() {
            tracing::debug!(
                problem_id,
                before = ?attempt.transition.before,
                after = %attempt.transition.after,
                "problem tier changed"
            );
        }
        Ok(attempt)
    }

    /// Move to the next round once the current one is fully attempted.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        progress: &MathFluencyProgress,
        config: &EngineConfig,
        rng: &mut R,
        now: i64,
    ) -> Result<SessionPhase, SessionError> {
        let round = self.current_round().ok_or(SessionError::Completed)?;
        let remaining = round.remaining();
        if remaining > 0 {
            return Err(SessionError::RoundIncomplete {
                phase: self.phase,
                remaining,
            });
        }
        let sub_level = config
            .curriculum
            .sub_level(&self.sub_level_id)
            .ok_or_else(|| SessionError::UnknownSubLevel(self.sub_level_id.clone()))?;

        let next = match self.phase {
            SessionPhase::Diagnostic => {
                let accuracy = self.diagnostic.accuracy().unwrap_or(0.0);
                self.fast_track = accuracy >= config.advancement.fast_track_diagnostic_accuracy;
                let plan = if self.fast_track {
                    Vec::new()
                } else {
                    plan_learning(progress, sub_level, config.session.learning_size, rng)
                };
                if plan.is_empty() {
                    self.learning = Round::skipped();
                    self.practice = Round::planned(self.plan_practice(progress, sub_level, config, rng));
                    SessionPhase::Practice
                } else {
                    self.learning = Round::planned(plan);
                    SessionPhase::Learning
                }
            }
            SessionPhase::Learning => {
                self.practice = Round::planned(self.plan_practice(progress, sub_level, config, rng));
                SessionPhase::Practice
            }
            SessionPhase::Practice => {
                self.quick_check = Round::planned(self.plan_quick_check(progress, sub_level, config, rng));
                SessionPhase::QuickCheck
            }
            SessionPhase::QuickCheck => {
                self.completed_at = Some(now);
                self.summary = Some(self.summarize(&config.quality, now));
                SessionPhase::Completed
            }
            SessionPhase::Completed => return Err(SessionError::Completed),
        };

        tracing::debug!(
            session_id = %self.id,
            from = %self.phase,
            to = %next,
            fast_track = self.fast_track,
            "session round advanced"
        );
        self.phase = next;
        Ok(next)
    }

    /// What the Advancement Engine needs from this session. Challenge problems
    /// never count toward the quick-check gate.
    pub fn outcome(&self) -> SessionOutcome {
        let accuracy = match &self.summary {
            Some(summary) => summary.accuracy,
            None => overall_accuracy(self.rounds()),
        };
        SessionOutcome {
            accuracy,
            fast_track: self.fast_track,
            quick_check_accuracy: self.quick_check.core_accuracy(),
        }
    }

    fn rounds(&self) -> [&Round; 4] {
        [&self.diagnostic, &self.learning, &self.practice, &self.quick_check]
    }

    /// Alternate challenges between practice (even positions) and quick-check.
    fn split_challenges(&self) -> (Vec<&ChallengeProblem>, Vec<&ChallengeProblem>) {
        let mut practice = Vec::new();
        let mut quick_check = Vec::new();
        for (i, challenge) in self.challenges.iter().enumerate() {
            if i % 2 == 0 {
                practice.push(challenge);
            } else {
                quick_check.push(challenge);
            }
        }
        (practice, quick_check)
    }

    fn plan_practice<R: Rng + ?Sized>(
        &self,
        progress: &MathFluencyProgress,
        sub_level: &SubLevel,
        config: &EngineConfig,
        rng: &mut R,
    ) -> Vec<SessionProblem> {
        let (challenges, _) = self.split_challenges();
        let mut taken: HashSet<String> = self.challenges.iter().map(|c| c.problem_id().to_string()).collect();
        let size = config.session.practice_size;

        let maintenance_slots = (size as f64 * config.session.maintenance_share).floor() as usize;
        let lower: Vec<&SubLevel> = config.curriculum.sub_levels_below(&sub_level.id);
        let mut maintenance: Vec<Problem> = progress
            .problem_banks
            .secure_problems()
            .filter(|p| lower.iter().any(|level| level.contains(&p.problem)))
            .map(|p| p.problem.clone())
            .collect();
        maintenance.shuffle(rng);

        let mut planned = Vec::with_capacity(size + challenges.len());
        push_unique(&mut planned, &mut taken, maintenance, maintenance_slots);

        let core_slots = size.saturating_sub(planned.len());
        let mut core = Vec::new();
        for tier in [Tier::DoesNotKnow, Tier::Emerging, Tier::Approaching, Tier::Proficient] {
            let mut bucket: Vec<Problem> = progress
                .problem_banks
                .tier(tier)
                .iter()
                .filter(|p| sub_level.contains(&p.problem))
                .map(|p| p.problem.clone())
                .collect();
            bucket.shuffle(rng);
            core.extend(bucket);
        }
        core.extend(unseen(progress, sub_level, rng));
        let mut mastered: Vec<Problem> = progress
            .problem_banks
            .tier(Tier::Mastered)
            .iter()
            .filter(|p| sub_level.contains(&p.problem))
            .map(|p| p.problem.clone())
            .collect();
        mastered.shuffle(rng);
        core.extend(mastered);
        push_unique(&mut planned, &mut taken, core, core_slots);

        planned.extend(challenges.into_iter().map(SessionProblem::challenge));
        planned.shuffle(rng);
        planned
    }

    fn plan_quick_check<R: Rng + ?Sized>(
        &self,
        progress: &MathFluencyProgress,
        sub_level: &SubLevel,
        config: &EngineConfig,
        rng: &mut R,
    ) -> Vec<SessionProblem> {
        let (_, challenges) = self.split_challenges();
        let mut taken: HashSet<String> = self.challenges.iter().map(|c| c.problem_id().to_string()).collect();
        let size = config.session.quick_check_size;

        let mut known: Vec<Problem> = progress
            .problem_banks
            .all_problems()
            .filter(|p| sub_level.contains(&p.problem))
            .map(|p| p.problem.clone())
            .collect();
        known.shuffle(rng);
        known.extend(unseen(progress, sub_level, rng));

        let mut planned = Vec::with_capacity(size + challenges.len());
        push_unique(&mut planned, &mut taken, known, size);
        planned.extend(challenges.into_iter().map(SessionProblem::challenge));
        planned.shuffle(rng);
        planned
    }

    fn summarize(&self, bands: &QualityBands, now: i64) -> SessionSummary {
        let attempts: Vec<&SessionAttempt> = self.rounds().into_iter().flat_map(|r| r.attempts.iter()).collect();
        let total = attempts.len();
        let correct = attempts.iter().filter(|a| a.correct).count();
        let accuracy = overall_accuracy(self.rounds());
        let average_response_time_ms = if total == 0 {
            0.0
        } else {
            attempts.iter().map(|a| a.response_time_ms as f64).sum::<f64>() / total as f64
        };
        let challenge: Vec<&&SessionAttempt> = attempts.iter().filter(|a| a.challenge.is_some()).collect();

        SessionSummary {
            duration_ms: (now - self.started_at).max(0),
            total_problems: total,
            correct,
            accuracy,
            average_response_time_ms,
            quality: SessionQuality::from_accuracy(accuracy, bands),
            diagnostic_accuracy: self.diagnostic.accuracy(),
            learning_accuracy: self.learning.accuracy(),
            practice_accuracy: self.practice.accuracy(),
            quick_check_accuracy: self.quick_check.accuracy(),
            learning_skipped: self.learning.skipped,
            fast_track: self.fast_track,
            challenge_attempts: challenge.len(),
            challenge_correct: challenge.iter().filter(|a| a.correct).count(),
            tier_transitions: self.practice.attempts.iter().map(|a| a.transition.clone()).collect(),
        }
    }
}

fn overall_accuracy(rounds: [&Round; 4]) -> f64 {
    let (total, correct) = rounds
        .iter()
        .fold((0usize, 0usize), |(t, c), r| (t + r.attempts.len(), c + r.correct()));
    if total == 0 {
        0.0
    } else {
        correct as f64 * 100.0 / total as f64
    }
}

/// Problems of `sub_level` the student has never attempted, shuffled.
fn unseen<R: Rng + ?Sized>(progress: &MathFluencyProgress, sub_level: &SubLevel, rng: &mut R) -> Vec<Problem> {
    let mut problems: Vec<Problem> = sub_level
        .problems()
        .into_iter()
        .filter(|p| !progress.problem_banks.contains(&p.id))
        .collect();
    problems.shuffle(rng);
    problems
}

/// Weakest known problems first, then unseen ones.
fn plan_learning<R: Rng + ?Sized>(
    progress: &MathFluencyProgress,
    sub_level: &SubLevel,
    size: usize,
    rng: &mut R,
) -> Vec<SessionProblem> {
    let mut candidates = Vec::new();
    for tier in [Tier::DoesNotKnow, Tier::Emerging, Tier::Approaching] {
        candidates.extend(
            progress
                .problem_banks
                .tier(tier)
                .iter()
                .filter(|p| sub_level.contains(&p.problem))
                .map(|p| p.problem.clone()),
        );
    }
    candidates.extend(unseen(progress, sub_level, rng));
    candidates.truncate(size);
    candidates.into_iter().map(SessionProblem::learning).collect()
}

fn push_unique(planned: &mut Vec<SessionProblem>, taken: &mut HashSet<String>, source: Vec<Problem>, slots: usize) {
    let mut added = 0;
    for problem in source {
        if added >= slots {
            break;
        }
        if taken.insert(problem.id.clone()) {
            planned.push(SessionProblem::plain(problem));
            added += 1;
        }
    }
}
