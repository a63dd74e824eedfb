//! Challenge problem selection.
//!
//! Fills up to `target_count` slots in priority order: next sub-level preview,
//! previous-operation retention, then earlier sub-levels of the current operation.
//! Empty categories are skipped; a short result is normal.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fluency::config::ChallengeParams;
use crate::fluency::curriculum::Curriculum;
use crate::fluency::progress::{MathFluencyProgress, ProblemProgress};
use crate::fluency::types::{ChallengeKind, Operation};

/// A selection result. The tag lives here, not on the durable `ProblemProgress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProblem {
    pub progress: ProblemProgress,
    pub kind: ChallengeKind,
}

impl ChallengeProblem {
    pub fn problem_id(&self) -> &str {
        self.progress.problem_id()
    }

    pub fn is_operation_change(&self) -> bool {
        self.kind.is_operation_change()
    }

    pub fn message(&self) -> String {
        self.kind.message(self.progress.operation())
    }
}

pub fn select_challenge_problems<R: Rng + ?Sized>(
    operation: Operation,
    sub_level_id: &str,
    all_operation_progress: &[MathFluencyProgress],
    target_count: usize,
    curriculum: &Curriculum,
    params: &ChallengeParams,
    rng: &mut R,
) -> Vec<ChallengeProblem> {
    let mut selected: Vec<ChallengeProblem> = Vec::with_capacity(target_count);
    let mut taken: HashSet<String> = HashSet::new();
    let current = all_operation_progress.iter().find(|p| p.operation == operation);

    // Next-level preview, drawn from the generated problem set.
    if let Some(next) = curriculum.next_sub_level(sub_level_id) {
        let quota = params.next_level_max.min(target_count);
        let candidates: Vec<ProblemProgress> = next
            .problems()
            .into_iter()
            .map(|problem| {
                current
                    .and_then(|p| p.problem_banks.get(&problem.id))
                    .cloned()
                    .unwrap_or_else(|| ProblemProgress::new(problem))
            })
            .collect();
        take_random(&candidates, quota, ChallengeKind::NextLevel, &mut selected, &mut taken, rng);
    }

    // Previous-operation retention.
    if let Some(previous_op) = curriculum.previous_operation(operation) {
        let remaining = target_count.saturating_sub(selected.len());
        let quota = params.previous_operation_max.min(remaining);
        if let Some(previous) = all_operation_progress.iter().find(|p| p.operation == previous_op) {
            let candidates: Vec<ProblemProgress> =
                previous.problem_banks.secure_problems().cloned().collect();
            take_random(&candidates, quota, ChallengeKind::PreviousOperation, &mut selected, &mut taken, rng);
        }
    }

    // Previous-level maintenance, one per lower sub-level, nearest first.
    if let Some(current) = current {
        for level in curriculum.sub_levels_below(sub_level_id) {
            if selected.len() >= target_count {
                break;
            }
            let candidates: Vec<ProblemProgress> = current
                .problem_banks
                .secure_problems()
                .filter(|p| level.contains(&p.problem))
                .cloned()
                .collect();
            take_random(&candidates, 1, ChallengeKind::PreviousLevel, &mut selected, &mut taken, rng);
        }
    }

    selected.truncate(target_count);
    tracing::debug!(
        operation = %operation,
        sub_level = sub_level_id,
        selected = selected.len(),
        target = target_count,
        "challenge problems selected"
    );
    selected
}

fn take_random<R: Rng + ?Sized>(
    candidates: &[ProblemProgress],
    quota: usize,
    kind: ChallengeKind,
    selected: &mut Vec<ChallengeProblem>,
    taken: &mut HashSet<String>,
    rng: &mut R,
) {
    if quota == 0 {
        return;
    }
    let fresh: Vec<&ProblemProgress> = candidates
        .iter()
        .filter(|p| !taken.contains(p.problem_id()))
        .collect();
    for progress in fresh.choose_multiple(rng, quota) {
        taken.insert(progress.problem_id().to_string());
        selected.push(ChallengeProblem {
            progress: (*progress).clone(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluency::config::TierCutPoints;
    use crate::fluency::problem::Problem;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record_correct(progress: &mut MathFluencyProgress, pairs: &[(u32, u32)]) {
        let cut = TierCutPoints::default();
        for &(l, r) in pairs {
            let problem = Problem::new(progress.operation, l, r).unwrap();
            progress.record_attempt(&problem, true, 800, 0, &cut);
        }
    }

    #[test]
    fn test_priority_order_and_tags() {
        let curriculum = Curriculum::default();
        let mut addition = MathFluencyProgress::new("s1", Operation::Addition, "sums-to-20", 0);
        record_correct(&mut addition, &[(12, 3), (13, 2), (9, 9), (3, 3)]);
        let mut subtraction = MathFluencyProgress::new("s1", Operation::Subtraction, "from-10", 0);
        record_correct(&mut subtraction, &[(1, 1), (2, 1), (4, 2), (9, 2)]);
        let all = vec![addition, subtraction];

        let mut rng = StdRng::seed_from_u64(7);
        let picked = select_challenge_problems(
            Operation::Subtraction,
            "from-10",
            &all,
            5,
            &curriculum,
            &ChallengeParams::default(),
            &mut rng,
        );

        assert_eq!(picked.len(), 5);
        let kinds: Vec<ChallengeKind> = picked.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChallengeKind::NextLevel,
                ChallengeKind::NextLevel,
                ChallengeKind::PreviousOperation,
                ChallengeKind::PreviousOperation,
                ChallengeKind::PreviousLevel,
            ]
        );
        assert!(picked[2].is_operation_change());
        assert_eq!(picked[2].progress.operation(), Operation::Addition);
        assert!(!picked[0].is_operation_change());
        let previous_level = &picked[4].progress.problem;
        assert!(curriculum.sub_level("from-5").unwrap().contains(previous_level));
    }

    #[test]
    fn test_short_list_when_sources_are_empty() {
        let curriculum = Curriculum::default();
        let addition = MathFluencyProgress::new("s1", Operation::Addition, "sums-to-20", 0);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = select_challenge_problems(
            Operation::Addition,
            "sums-to-20",
            &[addition],
            4,
            &curriculum,
            &ChallengeParams::default(),
            &mut rng,
        );
        assert!(picked.is_empty());
    }

    #[test]
    fn test_never_exceeds_target_or_duplicates() {
        let curriculum = Curriculum::default();
        let mut multiplication = MathFluencyProgress::new("s1", Operation::Multiplication, "times-6-10", 0);
        record_correct(&mut multiplication, &[(2, 1), (3, 2), (4, 3), (5, 4)]);
        let mut subtraction = MathFluencyProgress::new("s1", Operation::Subtraction, "from-20", 0);
        record_correct(&mut subtraction, &[(1, 1), (2, 1), (12, 3)]);
        let all = vec![multiplication, subtraction];

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            for target in 1..=5 {
                let picked = select_challenge_problems(
                    Operation::Multiplication,
                    "times-6-10",
                    &all,
                    target,
                    &curriculum,
                    &ChallengeParams::default(),
                    &mut rng,
                );
                assert!(picked.len() <= target);
                let ids: HashSet<&str> = picked.iter().map(|c| c.problem_id()).collect();
                assert_eq!(ids.len(), picked.len());
            }
        }
    }

    #[test]
    fn test_sampling_varies() {
        let curriculum = Curriculum::default();
        let addition = MathFluencyProgress::new("s1", Operation::Addition, "sums-to-5", 0);
        let all = vec![addition];
        let mut seen = HashSet::new();
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..10 {
            let picked = select_challenge_problems(
                Operation::Addition,
                "sums-to-5",
                &all,
                4,
                &curriculum,
                &ChallengeParams::default(),
                &mut rng,
            );
            for c in picked {
                seen.insert(c.problem_id().to_string());
            }
        }
        assert!(seen.len() > 2);
    }
}
