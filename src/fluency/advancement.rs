//! Sub-level advancement.
//!
//! Transitions only happen at session end and only forward. The decision itself
//! ([`evaluate`]) is a pure function of its input and the engine config; the
//! bookkeeping around it lives in [`conclude_session`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fluency::config::{AdvancementParams, EngineConfig};
use crate::fluency::curriculum::SubLevel;
use crate::fluency::proficiency::{
    compute_mastery_percentage, compute_operation_proficiency, compute_trend, push_snapshot,
};
use crate::fluency::progress::MathFluencyProgress;
use crate::fluency::types::{AdvancementMode, Operation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancementInput {
    pub operation: Operation,
    pub sub_level_id: String,
    pub mode: AdvancementMode,
    /// Operation-level proficiency of the current sub-level, 0-100.
    pub proficiency: f64,
    pub known_problems: usize,
    /// `None` when the quick-check round had no problems.
    pub quick_check_accuracy: Option<f64>,
    pub already_complete: bool,
}

/// Audit record of one advancement evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancementDecision {
    pub operation: Operation,
    pub mode: AdvancementMode,
    pub threshold: Option<f64>,
    pub proficiency: f64,
    pub from_sub_level: String,
    pub to_sub_level: Option<String>,
    pub advanced: bool,
    pub operation_complete: bool,
    pub reason: String,
}

/// What a finished session contributes to the advancement decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub accuracy: f64,
    pub fast_track: bool,
    pub quick_check_accuracy: Option<f64>,
}

/// Fast-track wins over high-performer, which wins over standard.
pub fn select_mode(fast_track: bool, high_accuracy_streak: u32, params: &AdvancementParams) -> AdvancementMode {
    if fast_track {
        AdvancementMode::FastTrack
    } else if params.high_performer_streak > 0 && high_accuracy_streak >= params.high_performer_streak {
        AdvancementMode::HighPerformer
    } else {
        AdvancementMode::Standard
    }
}

/// Sub-level override first, then the global table.
pub fn threshold_for(sub_level: &SubLevel, mode: AdvancementMode, config: &EngineConfig) -> Option<f64> {
    sub_level
        .threshold_overrides
        .get(&mode)
        .copied()
        .or_else(|| config.thresholds.get(mode))
}

pub fn evaluate(input: &AdvancementInput, config: &EngineConfig) -> AdvancementDecision {
    let hold = |threshold: Option<f64>, reason: String| AdvancementDecision {
        operation: input.operation,
        mode: input.mode,
        threshold,
        proficiency: input.proficiency,
        from_sub_level: input.sub_level_id.clone(),
        to_sub_level: None,
        advanced: false,
        operation_complete: false,
        reason,
    };

    let Some(sub_level) = config.curriculum.sub_level(&input.sub_level_id) else {
        tracing::warn!(sub_level = %input.sub_level_id, "advancement skipped: unknown sub-level");
        return hold(None, format!("unknown sub-level {}", input.sub_level_id));
    };
    let threshold = threshold_for(sub_level, input.mode, config);

    if input.already_complete && config.curriculum.next_sub_level(&sub_level.id).is_none() {
        return AdvancementDecision {
            operation_complete: true,
            ..hold(threshold, format!("{} already complete at {}", input.operation, sub_level.id))
        };
    }

    let Some(threshold_value) = threshold else {
        tracing::warn!(mode = %input.mode, sub_level = %sub_level.id, "advancement skipped: no threshold configured");
        return hold(None, format!("no {} threshold configured", input.mode));
    };

    let min_known = config.advancement.min_known_problems;
    if min_known > 0 && input.known_problems < min_known {
        return hold(
            threshold,
            format!(
                "only {} of the required {} problems attempted at {}",
                input.known_problems, min_known, sub_level.id
            ),
        );
    }

    if let Some(accuracy) = input.quick_check_accuracy {
        let floor = config.advancement.quick_check_min_accuracy;
        if accuracy < floor {
            return hold(
                threshold,
                format!("quick-check accuracy {accuracy:.0}% below {floor:.0}%"),
            );
        }
    }

    if input.proficiency < threshold_value {
        return hold(
            threshold,
            format!(
                "proficiency {:.1}% below {} threshold {:.0}%",
                input.proficiency, input.mode, threshold_value
            ),
        );
    }

    match config.curriculum.next_sub_level(&sub_level.id) {
        Some(next) => AdvancementDecision {
            to_sub_level: Some(next.id.clone()),
            advanced: true,
            ..hold(
                threshold,
                format!(
                    "proficiency {:.1}% met {} threshold {:.0}%: {} -> {}",
                    input.proficiency, input.mode, threshold_value, sub_level.id, next.id
                ),
            )
        },
        None => AdvancementDecision {
            operation_complete: true,
            ..hold(
                threshold,
                format!(
                    "proficiency {:.1}% met {} threshold {:.0}% at final sub-level; {} complete",
                    input.proficiency, input.mode, threshold_value, input.operation
                ),
            )
        },
    }
}

/// Apply a decision to the record. Never moves backwards.
pub fn apply_decision(progress: &mut MathFluencyProgress, decision: &AdvancementDecision) {
    if decision.from_sub_level != progress.sub_level {
        tracing::warn!(
            decided_for = %decision.from_sub_level,
            current = %progress.sub_level,
            "stale advancement decision ignored"
        );
        return;
    }
    if decision.advanced {
        if let Some(next) = &decision.to_sub_level {
            progress.sub_level = next.clone();
            progress.high_accuracy_streak = 0;
        }
    }
    if decision.operation_complete {
        progress.completed = true;
    }
}

/// Session-end bookkeeping followed by the advancement decision.
pub fn conclude_session(
    progress: &mut MathFluencyProgress,
    outcome: &SessionOutcome,
    config: &EngineConfig,
    now: i64,
) -> AdvancementDecision {
    progress.total_sessions = progress.total_sessions.saturating_add(1);
    update_practice_days(progress, now);

    if outcome.accuracy >= config.advancement.high_accuracy_session {
        progress.high_accuracy_streak = progress.high_accuracy_streak.saturating_add(1);
    } else {
        progress.high_accuracy_streak = 0;
    }

    let current = config
        .curriculum
        .sub_level(&progress.sub_level)
        .map(|level| compute_operation_proficiency(&progress.problem_banks, level, &config.secure_weights));
    let (proficiency, known) = current
        .map(|c| (c.percentage, c.known_problems))
        .unwrap_or((0.0, 0));

    progress.proficiency_percentage = proficiency;
    progress.mastery_percentage = compute_mastery_percentage(&progress.problem_banks);
    push_snapshot(&mut progress.proficiency_history, proficiency, &config.trend);
    progress.trend = compute_trend(&progress.proficiency_history, &config.trend);
    tracing::debug!(
        student = %progress.student_uid,
        operation = %progress.operation,
        proficiency,
        trend = progress.trend.as_str(),
        "proficiency snapshot"
    );

    let input = AdvancementInput {
        operation: progress.operation,
        sub_level_id: progress.sub_level.clone(),
        mode: select_mode(outcome.fast_track, progress.high_accuracy_streak, &config.advancement),
        proficiency,
        known_problems: known,
        quick_check_accuracy: outcome.quick_check_accuracy,
        already_complete: progress.completed,
    };
    let decision = evaluate(&input, config);
    apply_decision(progress, &decision);
    progress.updated_at = now;
    decision
}

fn update_practice_days(progress: &mut MathFluencyProgress, now: i64) {
    let Some(today) = DateTime::<Utc>::from_timestamp_millis(now).map(|dt| dt.date_naive()) else {
        return;
    };
    progress.consecutive_practice_days =
        next_day_streak(progress.last_practice_day, today, progress.consecutive_practice_days);
    if progress.last_practice_day.map_or(true, |last| today > last) {
        progress.last_practice_day = Some(today);
    }
}

fn next_day_streak(last: Option<NaiveDate>, today: NaiveDate, current: u32) -> u32 {
    match last {
        None => 1,
        Some(last) if last == today => current.max(1),
        Some(last) if last.succ_opt() == Some(today) => current.saturating_add(1),
        Some(last) if last > today => current,
        Some(_) => 1,
    }
}
