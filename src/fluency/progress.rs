use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fluency::banks::ProblemBanks;
use crate::fluency::config::TierCutPoints;
use crate::fluency::problem::Problem;
use crate::fluency::proficiency::compute_problem_proficiency;
use crate::fluency::types::{Attempt, Operation, Tier, TrendState, DECISION_WINDOW};

/// Per-student mastery state of one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemProgress {
    #[serde(flatten)]
    pub problem: Problem,
    pub proficiency_level: Tier,
    /// Most recent attempts, oldest first, never longer than [`DECISION_WINDOW`].
    pub last_attempts: VecDeque<Attempt>,
    pub total_attempts: u32,
    pub total_correct: u32,
}

impl ProblemProgress {
    pub fn new(problem: Problem) -> Self {
        Self {
            problem,
            proficiency_level: Tier::DoesNotKnow,
            last_attempts: VecDeque::with_capacity(DECISION_WINDOW),
            total_attempts: 0,
            total_correct: 0,
        }
    }

    pub fn problem_id(&self) -> &str {
        &self.problem.id
    }

    pub fn operation(&self) -> Operation {
        self.problem.operation
    }

    pub fn record(&mut self, attempt: Attempt) {
        self.total_attempts = self.total_attempts.saturating_add(1);
        if attempt.correct {
            self.total_correct = self.total_correct.saturating_add(1);
        }
        self.last_attempts.push_back(attempt);
        while self.last_attempts.len() > DECISION_WINDOW {
            self.last_attempts.pop_front();
        }
    }

    pub fn last_attempted_at(&self) -> Option<i64> {
        self.last_attempts.back().map(|a| a.timestamp)
    }
}

/// Tier movement caused by one attempt. `before` is `None` for a first sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierTransition {
    pub problem_id: String,
    pub before: Option<Tier>,
    pub after: Tier,
    pub percentage: f64,
}

impl TierTransition {
    pub fn changed(&self) -> bool {
        self.before != Some(self.after)
    }
}

/// One student's state for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathFluencyProgress {
    pub student_uid: String,
    pub operation: Operation,
    pub sub_level: String,
    pub problem_banks: ProblemBanks,
    /// Secure share of the current sub-level's known problems, 0-100.
    pub proficiency_percentage: f64,
    /// Mastered share of every known problem, 0-100.
    pub mastery_percentage: f64,
    pub consecutive_practice_days: u32,
    pub last_practice_day: Option<NaiveDate>,
    pub total_sessions: u32,
    pub sessions_started: u32,
    /// Consecutive high-accuracy sessions at the current sub-level.
    pub high_accuracy_streak: u32,
    pub proficiency_history: Vec<f64>,
    pub trend: TrendState,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MathFluencyProgress {
    pub fn new(student_uid: &str, operation: Operation, sub_level: &str, now: i64) -> Self {
        Self {
            student_uid: student_uid.to_string(),
            operation,
            sub_level: sub_level.to_string(),
            problem_banks: ProblemBanks::default(),
            proficiency_percentage: 0.0,
            mastery_percentage: 0.0,
            consecutive_practice_days: 0,
            last_practice_day: None,
            total_sessions: 0,
            sessions_started: 0,
            high_accuracy_streak: 0,
            proficiency_history: Vec::new(),
            trend: TrendState::Flat,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an attempt to the problem's history and re-tier it immediately.
    pub fn record_attempt(
        &mut self,
        problem: &Problem,
        correct: bool,
        response_time_ms: u32,
        now: i64,
        cut_points: &TierCutPoints,
    ) -> TierTransition {
        let (mut progress, before) = match self.problem_banks.remove(&problem.id) {
            Some(existing) => {
                let tier = existing.proficiency_level;
                (existing, Some(tier))
            }
            None => (ProblemProgress::new(problem.clone()), None),
        };

        progress.record(Attempt {
            correct,
            response_time_ms,
            timestamp: now,
        });
        let proficiency = compute_problem_proficiency(&progress.last_attempts, cut_points);
        self.problem_banks.upsert(progress, proficiency.tier);
        self.updated_at = now;

        TierTransition {
            problem_id: problem.id.clone(),
            before,
            after: proficiency.tier,
            percentage: proficiency.percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(left: u32, right: u32) -> Problem {
        Problem::new(Operation::Addition, left, right).unwrap()
    }

    #[test]
    fn test_history_is_bounded() {
        let mut progress = ProblemProgress::new(add(1, 2));
        for i in 0..8 {
            progress.record(Attempt {
                correct: i % 2 == 0,
                response_time_ms: 1000,
                timestamp: i,
            });
        }
        assert_eq!(progress.last_attempts.len(), DECISION_WINDOW);
        assert_eq!(progress.total_attempts, 8);
        assert_eq!(progress.total_correct, 4);
        assert_eq!(progress.last_attempts.front().map(|a| a.timestamp), Some(3));
    }

    #[test]
    fn test_record_attempt_sliding_window_regression() {
        let cut = TierCutPoints::default();
        let mut progress = MathFluencyProgress::new("s1", Operation::Addition, "sums-to-10", 0);
        let problem = add(4, 5);

        for (i, correct) in [true, true, false, true, true].into_iter().enumerate() {
            progress.record_attempt(&problem, correct, 1500, i as i64, &cut);
        }
        let stored = progress.problem_banks.get(&problem.id).unwrap();
        assert_eq!(stored.proficiency_level, Tier::Proficient);

        let transition = progress.record_attempt(&problem, false, 1500, 10, &cut);
        assert_eq!(transition.before, Some(Tier::Proficient));
        assert_eq!(transition.after, Tier::Approaching);
        assert!((transition.percentage - 60.0).abs() < 1e-9);
        assert_eq!(progress.problem_banks.len(), 1);
    }

    #[test]
    fn test_first_sighting_has_no_prior_tier() {
        let cut = TierCutPoints::default();
        let mut progress = MathFluencyProgress::new("s1", Operation::Addition, "sums-to-10", 0);
        let transition = progress.record_attempt(&add(2, 3), true, 900, 5, &cut);
        assert_eq!(transition.before, None);
        assert_eq!(transition.after, Tier::Mastered);
        assert!(transition.changed());
        assert_eq!(progress.updated_at, 5);
    }

    #[test]
    fn test_stored_entry_uses_problem_id_and_correct_answer() {
        let mut progress = ProblemProgress::new(add(4, 5));
        progress.record(Attempt {
            correct: true,
            response_time_ms: 800,
            timestamp: 1,
        });
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["problemId"], "addition:4:5");
        assert_eq!(json["correctAnswer"], 9);
        assert!(json.get("id").is_none());
        assert!(json.get("answer").is_none());

        let back: ProblemProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }
}
