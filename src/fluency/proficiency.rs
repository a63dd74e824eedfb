use serde::{Deserialize, Serialize};

use crate::fluency::banks::ProblemBanks;
use crate::fluency::config::{SecureTierWeights, TierCutPoints, TrendParams};
use crate::fluency::curriculum::SubLevel;
use crate::fluency::types::{Attempt, Tier, TrendState, DECISION_WINDOW};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemProficiency {
    pub tier: Tier,
    pub percentage: f64,
}

/// Tier and percentage from the last [`DECISION_WINDOW`] attempts only. Older
/// attempts never count, so mastery decays when recent answers regress.
pub fn compute_problem_proficiency<'a, I>(history: I, cut_points: &TierCutPoints) -> ProblemProficiency
where
    I: IntoIterator<Item = &'a Attempt>,
    I::IntoIter: DoubleEndedIterator,
{
    let recent: Vec<&Attempt> = history.into_iter().rev().take(DECISION_WINDOW).collect();
    if recent.is_empty() {
        return ProblemProficiency {
            tier: Tier::DoesNotKnow,
            percentage: 0.0,
        };
    }

    let correct = recent.iter().filter(|a| a.correct).count();
    let percentage = (correct as f64 * 100.0) / recent.len() as f64;

    ProblemProficiency {
        tier: cut_points.tier_for(percentage),
        percentage,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProficiency {
    pub percentage: f64,
    pub known_problems: usize,
    pub secure_problems: usize,
}

/// Weighted share of secure problems among the known problems of `sub_level` only.
pub fn compute_operation_proficiency(
    banks: &ProblemBanks,
    sub_level: &SubLevel,
    weights: &SecureTierWeights,
) -> OperationProficiency {
    let mut known = 0usize;
    let mut secure = 0usize;
    let mut weighted = 0.0;

    for progress in banks.all_problems().filter(|p| sub_level.contains(&p.problem)) {
        known += 1;
        if progress.proficiency_level.is_secure() {
            secure += 1;
        }
        weighted += weights.weight(progress.proficiency_level);
    }

    let percentage = if known == 0 {
        0.0
    } else {
        (weighted * 100.0 / known as f64).clamp(0.0, 100.0)
    };

    OperationProficiency {
        percentage,
        known_problems: known,
        secure_problems: secure,
    }
}

/// Share of every known problem sitting in `mastered`, 0-100.
pub fn compute_mastery_percentage(banks: &ProblemBanks) -> f64 {
    let total = banks.len();
    if total == 0 {
        return 0.0;
    }
    banks.count(Tier::Mastered) as f64 * 100.0 / total as f64
}

/// Compare the latest snapshot with the one before it. Diagnostic only.
pub fn compute_trend(history: &[f64], params: &TrendParams) -> TrendState {
    match history {
        [.., prior, latest] => {
            let delta = latest - prior;
            if delta > params.dead_band {
                TrendState::Up
            } else if delta < -params.dead_band {
                TrendState::Down
            } else {
                TrendState::Flat
            }
        }
        _ => TrendState::Flat,
    }
}

/// Append a snapshot, keeping at most `params.history_len` entries.
pub fn push_snapshot(history: &mut Vec<f64>, percentage: f64, params: &TrendParams) {
    history.push(percentage);
    if history.len() > params.history_len {
        let excess = history.len() - params.history_len;
        history.drain(..excess);
    }
}
