use serde::{Deserialize, Serialize};

/// Number of most recent attempts that decide a problem's tier.
pub const DECISION_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl Operation {
    pub fn all() -> &'static [Operation] {
        &[
            Operation::Addition,
            Operation::Subtraction,
            Operation::Multiplication,
            Operation::Division,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Subtraction => "subtraction",
            Self::Multiplication => "multiplication",
            Self::Division => "division",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Addition => "+",
            Self::Subtraction => "−",
            Self::Multiplication => "×",
            Self::Division => "÷",
        }
    }

    /// Unknown names yield `None`; callers treat that as "no such item".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "addition" | "add" => Some(Self::Addition),
            "subtraction" | "subtract" => Some(Self::Subtraction),
            "multiplication" | "multiply" => Some(Self::Multiplication),
            "division" | "divide" => Some(Self::Division),
            _ => None,
        }
    }

    /// Exact result of `left op right`, `None` when the fact has no whole-number answer.
    pub fn apply(&self, left: u32, right: u32) -> Option<u32> {
        match self {
            Self::Addition => left.checked_add(right),
            Self::Subtraction => left.checked_sub(right),
            Self::Multiplication => left.checked_mul(right),
            Self::Division => {
                if right == 0 || left % right != 0 {
                    None
                } else {
                    Some(left / right)
                }
            }
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mastery bucket, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[derive(Default)]
pub enum Tier {
    #[default]
    DoesNotKnow,
    Emerging,
    Approaching,
    Proficient,
    Mastered,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[
            Tier::DoesNotKnow,
            Tier::Emerging,
            Tier::Approaching,
            Tier::Proficient,
            Tier::Mastered,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoesNotKnow => "doesNotKnow",
            Self::Emerging => "emerging",
            Self::Approaching => "approaching",
            Self::Proficient => "proficient",
            Self::Mastered => "mastered",
        }
    }

    /// Proficient or mastered.
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Proficient | Self::Mastered)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub correct: bool,
    pub response_time_ms: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvancementMode {
    Standard,
    FastTrack,
    HighPerformer,
}

impl AdvancementMode {
    pub fn all() -> &'static [AdvancementMode] {
        &[
            AdvancementMode::Standard,
            AdvancementMode::FastTrack,
            AdvancementMode::HighPerformer,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::FastTrack => "fast-track",
            Self::HighPerformer => "high-performer",
        }
    }
}

impl std::fmt::Display for AdvancementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a problem was pulled into a session from outside the current sub-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeKind {
    NextLevel,
    PreviousOperation,
    PreviousLevel,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextLevel => "next-level",
            Self::PreviousOperation => "previous-operation",
            Self::PreviousLevel => "previous-level",
        }
    }

    /// Only previous-operation problems cross operation identity.
    pub fn is_operation_change(&self) -> bool {
        matches!(self, Self::PreviousOperation)
    }

    pub fn message(&self, operation: Operation) -> String {
        match self {
            Self::NextLevel => "Sneak peek: this one is from your next level!".to_string(),
            Self::PreviousOperation => {
                format!("Switching gears: time for some {operation} review!")
            }
            Self::PreviousLevel => "Remember this one from an earlier level?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum TrendState {
    Up,
    #[default]
    Flat,
    Down,
}

impl TrendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Flat => "flat",
            Self::Down => "down",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_apply() {
        assert_eq!(Operation::Addition.apply(3, 7), Some(10));
        assert_eq!(Operation::Subtraction.apply(3, 7), None);
        assert_eq!(Operation::Multiplication.apply(6, 7), Some(42));
        assert_eq!(Operation::Division.apply(12, 4), Some(3));
        assert_eq!(Operation::Division.apply(12, 5), None);
        assert_eq!(Operation::Division.apply(12, 0), None);
    }

    #[test]
    fn test_operation_parse_unknown() {
        assert_eq!(Operation::parse("Addition"), Some(Operation::Addition));
        assert_eq!(Operation::parse("exponent"), None);
    }

    #[test]
    fn test_tier_serde_names() {
        let json = serde_json::to_string(&Tier::DoesNotKnow).unwrap();
        assert_eq!(json, "\"doesNotKnow\"");
        let mode = serde_json::to_string(&AdvancementMode::FastTrack).unwrap();
        assert_eq!(mode, "\"fast-track\"");
    }

    #[test]
    fn test_only_previous_operation_changes_topic() {
        assert!(ChallengeKind::PreviousOperation.is_operation_change());
        assert!(!ChallengeKind::NextLevel.is_operation_change());
        assert!(!ChallengeKind::PreviousLevel.is_operation_change());
    }
}
