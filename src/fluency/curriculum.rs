//! Static curriculum: ordered sub-levels per operation, ordered operations.
//!
//! All lookups are pure. Unknown ids resolve to `None`/empty, never to a
//! placeholder that could collide with a real sub-level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fluency::config::{ensure_unique, ConfigError};
use crate::fluency::problem::Problem;
use crate::fluency::progress::ProblemProgress;
use crate::fluency::types::{AdvancementMode, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandRange {
    pub min: u32,
    pub max: u32,
}

impl OperandRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

/// Membership rule: both operands and the exact result must fall in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandRule {
    pub left: OperandRange,
    pub right: OperandRange,
    pub result: OperandRange,
}

impl OperandRule {
    pub fn matches(&self, operation: Operation, left: u32, right: u32) -> bool {
        if !self.left.contains(left) || !self.right.contains(right) {
            return false;
        }
        operation
            .apply(left, right)
            .is_some_and(|result| self.result.contains(result))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubLevel {
    pub id: String,
    pub name: String,
    pub operation: Operation,
    pub ordinal: u32,
    pub rule: OperandRule,
    /// Replaces the global threshold for the listed modes at this sub-level only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub threshold_overrides: BTreeMap<AdvancementMode, f64>,
}

impl SubLevel {
    pub fn contains(&self, problem: &Problem) -> bool {
        problem.operation == self.operation
            && self.rule.matches(problem.operation, problem.left, problem.right)
    }

    /// Every problem this sub-level's rule admits, in operand order.
    pub fn problems(&self) -> Vec<Problem> {
        let mut problems = Vec::new();
        for left in self.rule.left.min..=self.rule.left.max {
            for right in self.rule.right.min..=self.rule.right.max {
                if !self.rule.matches(self.operation, left, right) {
                    continue;
                }
                if let Some(problem) = Problem::new(self.operation, left, right) {
                    problems.push(problem);
                }
            }
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationTrack {
    pub operation: Operation,
    pub sub_levels: Vec<SubLevel>,
}

/// Tracks are stored in cross-operation review order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    pub tracks: Vec<OperationTrack>,
}

impl Curriculum {
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.tracks.iter().map(|t| t.operation)
    }

    pub fn sub_levels_for_operation(&self, operation: Operation) -> &[SubLevel] {
        self.track(operation).map(|t| t.sub_levels.as_slice()).unwrap_or(&[])
    }

    pub fn sub_level(&self, id: &str) -> Option<&SubLevel> {
        self.tracks
            .iter()
            .flat_map(|t| t.sub_levels.iter())
            .find(|s| s.id == id)
    }

    pub fn first_sub_level(&self, operation: Operation) -> Option<&SubLevel> {
        self.sub_levels_for_operation(operation).first()
    }

    /// `None` at the last sub-level of an operation, and for unknown ids.
    pub fn next_sub_level(&self, id: &str) -> Option<&SubLevel> {
        let (levels, idx) = self.position(id)?;
        levels.get(idx + 1)
    }

    pub fn previous_sub_level(&self, id: &str) -> Option<&SubLevel> {
        let (levels, idx) = self.position(id)?;
        idx.checked_sub(1).and_then(|i| levels.get(i))
    }

    /// Sub-levels below `id` within its operation, nearest first.
    pub fn sub_levels_below(&self, id: &str) -> Vec<&SubLevel> {
        match self.position(id) {
            Some((levels, idx)) => levels[..idx].iter().rev().collect(),
            None => Vec::new(),
        }
    }

    pub fn previous_operation(&self, operation: Operation) -> Option<Operation> {
        let idx = self.tracks.iter().position(|t| t.operation == operation)?;
        idx.checked_sub(1).map(|i| self.tracks[i].operation)
    }

    pub fn next_operation(&self, operation: Operation) -> Option<Operation> {
        let idx = self.tracks.iter().position(|t| t.operation == operation)?;
        self.tracks.get(idx + 1).map(|t| t.operation)
    }

    pub fn sub_level_for_problem(&self, problem: &Problem) -> Option<&SubLevel> {
        self.sub_levels_for_operation(problem.operation)
            .iter()
            .find(|s| s.contains(problem))
    }

    /// Filter `problems` down to those belonging to sub-level `id`; empty for unknown ids.
    pub fn problems_belonging_to_sub_level<'a, I>(&self, problems: I, id: &str) -> Vec<&'a ProblemProgress>
    where
        I: IntoIterator<Item = &'a ProblemProgress>,
    {
        match self.sub_level(id) {
            Some(level) => problems
                .into_iter()
                .filter(|p| level.contains(&p.problem))
                .collect(),
            None => Vec::new(),
        }
    }

    fn track(&self, operation: Operation) -> Option<&OperationTrack> {
        self.tracks.iter().find(|t| t.operation == operation)
    }

    fn position(&self, id: &str) -> Option<(&[SubLevel], usize)> {
        self.tracks.iter().find_map(|t| {
            t.sub_levels
                .iter()
                .position(|s| s.id == id)
                .map(|idx| (t.sub_levels.as_slice(), idx))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for &operation in Operation::all() {
            let track = self
                .track(operation)
                .ok_or(ConfigError::MissingOperation(operation))?;
            if track.sub_levels.is_empty() {
                return Err(ConfigError::MissingOperation(operation));
            }
        }
        if self.tracks.len() != Operation::all().len() {
            return Err(ConfigError::Validation(
                "each operation must appear exactly once in the curriculum".to_string(),
            ));
        }

        ensure_unique(
            self.tracks
                .iter()
                .flat_map(|t| t.sub_levels.iter())
                .map(|s| s.id.as_str()),
        )?;

        for track in &self.tracks {
            let mut last_ordinal = None;
            for level in &track.sub_levels {
                if level.operation != track.operation {
                    return Err(ConfigError::Validation(format!(
                        "sub-level {} is filed under {} but declares {}",
                        level.id, track.operation, level.operation
                    )));
                }
                if last_ordinal.is_some_and(|prev| level.ordinal <= prev) {
                    return Err(ConfigError::Validation(format!(
                        "sub-level {} breaks ordinal order",
                        level.id
                    )));
                }
                last_ordinal = Some(level.ordinal);

                let rule = &level.rule;
                if rule.left.is_empty() || rule.right.is_empty() || rule.result.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "sub-level {} has an empty operand range",
                        level.id
                    )));
                }
                if level.problems().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "sub-level {} admits no problems",
                        level.id
                    )));
                }
                for (mode, value) in &level.threshold_overrides {
                    if !(*value > 0.0 && *value <= 100.0) {
                        return Err(ConfigError::Validation(format!(
                            "sub-level {} override for {mode} out of range",
                            level.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn level(id: &str, name: &str, operation: Operation, ordinal: u32, rule: OperandRule) -> SubLevel {
    SubLevel {
        id: id.to_string(),
        name: name.to_string(),
        operation,
        ordinal,
        rule,
        threshold_overrides: BTreeMap::new(),
    }
}

const fn rule(left: (u32, u32), right: (u32, u32), result: (u32, u32)) -> OperandRule {
    OperandRule {
        left: OperandRange::new(left.0, left.1),
        right: OperandRange::new(right.0, right.1),
        result: OperandRange::new(result.0, result.1),
    }
}

impl Default for Curriculum {
    fn default() -> Self {
        use Operation::*;

        let addition = vec![
            level("sums-to-5", "Sums to 5", Addition, 1, rule((0, 5), (0, 5), (0, 5))),
            level("sums-to-10", "Sums to 10", Addition, 2, rule((0, 10), (0, 10), (6, 10))),
            level("sums-to-20", "Sums to 20", Addition, 3, rule((0, 10), (0, 10), (11, 20))),
        ];
        let subtraction = vec![
            level("from-5", "Subtracting from 5", Subtraction, 1, rule((0, 5), (0, 5), (0, 5))),
            level("from-10", "Subtracting from 10", Subtraction, 2, rule((6, 10), (0, 10), (0, 10))),
            level("from-20", "Subtracting from 20", Subtraction, 3, rule((11, 20), (0, 10), (0, 10))),
        ];
        let multiplication = vec![
            level("times-0-2", "Times 0, 1, 2", Multiplication, 1, rule((0, 10), (0, 2), (0, 100))),
            level("times-3-5", "Times 3, 4, 5", Multiplication, 2, rule((0, 10), (3, 5), (0, 100))),
            level("times-6-10", "Times 6 to 10", Multiplication, 3, rule((0, 10), (6, 10), (0, 100))),
        ];
        let division = vec![
            level("divide-by-1-2", "Dividing by 1 and 2", Division, 1, rule((0, 20), (1, 2), (0, 10))),
            level("divide-by-3-5", "Dividing by 3, 4, 5", Division, 2, rule((0, 50), (3, 5), (0, 10))),
            level("divide-by-6-10", "Dividing by 6 to 10", Division, 3, rule((0, 100), (6, 10), (0, 10))),
        ];

        Self {
            tracks: vec![
                OperationTrack { operation: Addition, sub_levels: addition },
                OperationTrack { operation: Subtraction, sub_levels: subtraction },
                OperationTrack { operation: Multiplication, sub_levels: multiplication },
                OperationTrack { operation: Division, sub_levels: division },
            ],
        }
    }
}
