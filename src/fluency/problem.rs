use serde::{Deserialize, Serialize};

use crate::fluency::fraction;
use crate::fluency::types::Operation;

/// An arithmetic fact. Identity is derived from operands and operation only, so
/// regenerating the same fact always yields the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(rename = "problemId")]
    pub id: String,
    pub operation: Operation,
    pub left: u32,
    pub right: u32,
    #[serde(rename = "correctAnswer")]
    pub answer: u32,
    pub display: String,
}

impl Problem {
    /// `None` when the operands have no whole-number answer (negative difference,
    /// inexact or zero division).
    pub fn new(operation: Operation, left: u32, right: u32) -> Option<Self> {
        let answer = operation.apply(left, right)?;
        Some(Self {
            id: problem_id(operation, left, right),
            operation,
            left,
            right,
            answer,
            display: format!("{} {} {}", left, operation.symbol(), right),
        })
    }

    pub fn correct_answer(&self) -> String {
        self.answer.to_string()
    }

    /// Every accepted form; the normalizer handles equivalent spellings.
    pub fn accepted_answers(&self) -> Vec<String> {
        vec![self.correct_answer()]
    }

    pub fn grade(&self, answer: &str) -> bool {
        fraction::matches_any(answer, &self.accepted_answers())
    }
}

pub fn problem_id(operation: Operation, left: u32, right: u32) -> String {
    format!("{}:{}:{}", operation.as_str(), left, right)
}

/// Inverse of [`problem_id`]; `None` for anything that is not a well-formed id.
pub fn parse_problem_id(id: &str) -> Option<(Operation, u32, u32)> {
    let mut parts = id.split(':');
    let operation = Operation::parse(parts.next()?)?;
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((operation, left, right))
}
